use anyhow::Result;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// Microphone capture pushing mono f32 chunks into a broadcast channel.
pub struct AudioCapture {
    device: Device,
    stream: Option<Box<Stream>>,
    sender: Arc<Mutex<Option<broadcast::Sender<Vec<f32>>>>>,
    sample_rate: u32,
}

impl AudioCapture {
    pub fn new(sample_rate: u32) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| anyhow::anyhow!("No default input device found"))?;

        tracing::info!("Using input device: {}", device.name()?);

        Ok(Self {
            device,
            stream: None,
            sender: Arc::new(Mutex::new(None)),
            sample_rate,
        })
    }

    pub fn start(&mut self, tx: broadcast::Sender<Vec<f32>>) -> Result<()> {
        *self.sender.lock().unwrap() = Some(tx);

        let config = self.negotiate_config()?;
        let sender = Arc::clone(&self.sender);
        let error_callback = |err| {
            tracing::error!("Audio stream error: {}", err);
        };

        let sample_format = self
            .device
            .default_input_config()
            .map(|c| c.sample_format())
            .unwrap_or(SampleFormat::F32);

        let stream: Stream = match sample_format {
            SampleFormat::F32 => self.device.build_input_stream(
                &config,
                move |data: &[f32], _: &_| Self::forward(data, &sender),
                error_callback,
                None,
            )?,
            SampleFormat::I16 => self.device.build_input_stream(
                &config,
                move |data: &[i16], _: &_| {
                    let converted: Vec<f32> =
                        data.iter().map(|&s| s as f32 / i16::MAX as f32).collect();
                    Self::forward(&converted, &sender);
                },
                error_callback,
                None,
            )?,
            SampleFormat::U16 => self.device.build_input_stream(
                &config,
                move |data: &[u16], _: &_| {
                    let converted: Vec<f32> = data
                        .iter()
                        .map(|&s| (s as i32 - i16::MAX as i32) as f32 / i16::MAX as f32)
                        .collect();
                    Self::forward(&converted, &sender);
                },
                error_callback,
                None,
            )?,
            format => {
                return Err(anyhow::anyhow!("Unsupported sample format: {:?}", format));
            }
        };

        stream.play()?;
        self.stream = Some(Box::new(stream));

        tracing::info!("Audio capture started at {} Hz", self.sample_rate);
        Ok(())
    }

    fn negotiate_config(&self) -> Result<StreamConfig> {
        for supported in self.device.supported_input_configs()? {
            if supported.channels() == 1
                && supported.min_sample_rate().0 <= self.sample_rate
                && supported.max_sample_rate().0 >= self.sample_rate
            {
                return Ok(supported
                    .with_sample_rate(cpal::SampleRate(self.sample_rate))
                    .into());
            }
        }
        Err(anyhow::anyhow!(
            "No mono input configuration at {} Hz",
            self.sample_rate
        ))
    }

    fn forward(data: &[f32], sender: &Arc<Mutex<Option<broadcast::Sender<Vec<f32>>>>>) {
        // Never block the audio callback: try_lock and drop on contention.
        if let Ok(guard) = sender.try_lock() {
            if let Some(tx) = guard.as_ref() {
                let _ = tx.send(data.to_vec());
            }
        }
    }

    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
        }
        *self.sender.lock().unwrap() = None;
        tracing::info!("Audio capture stopped");
    }
}

unsafe impl Send for AudioCapture {}
