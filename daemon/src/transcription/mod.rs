pub mod model;
pub mod recognizer;

/// Clean one raw transcript fragment before wake matching: drop bracketed
/// annotations the model emits ("[BLANK_AUDIO]", "(coughs)"), collapse
/// immediate word repeats, squeeze whitespace.
pub fn clean_transcript(text: &str) -> String {
    let re = regex::Regex::new(r"\[.*?\]|\{.*?\}|\(.*?\)").unwrap();
    let text = re.replace_all(text, " ");

    let mut deduped: Vec<&str> = Vec::new();
    for word in text.split_whitespace() {
        if deduped.last().map_or(true, |last| *last != word) {
            deduped.push(word);
        }
    }
    deduped.join(" ")
}
