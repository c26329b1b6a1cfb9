// Channel down-mixing, sample-rate conversion and fixed-size framing
//
// Device blocks arrive at whatever rate and channel layout the hardware
// negotiated. The live channel wants mono 16 kHz frames of a fixed size,
// so every block passes through a `Framer` on its way out.

/// Average interleaved channels into mono
pub fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }

    let channels = channels as usize;
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Streaming linear-interpolation resampler
///
/// Keeps the last input sample and the fractional read position between
/// calls so consecutive blocks join without clicks.
#[derive(Debug, Clone)]
pub struct LinearResampler {
    from_rate: u32,
    to_rate: u32,
    position: f64,
    carry: Option<f32>,
}

impl LinearResampler {
    pub fn new(from_rate: u32, to_rate: u32) -> Self {
        Self {
            from_rate,
            to_rate,
            position: 0.0,
            carry: None,
        }
    }

    pub fn is_passthrough(&self) -> bool {
        self.from_rate == self.to_rate
    }

    /// Resample one block, appending the output to `out`
    pub fn process(&mut self, input: &[f32], out: &mut Vec<f32>) {
        if self.is_passthrough() || self.from_rate == 0 || self.to_rate == 0 {
            out.extend_from_slice(input);
            return;
        }
        if input.is_empty() {
            return;
        }

        let step = self.from_rate as f64 / self.to_rate as f64;
        let carry = self.carry;
        let offset = usize::from(carry.is_some());
        let len = input.len() + offset;
        let at = |i: usize| -> f32 {
            match (i, carry) {
                (0, Some(carry)) => carry,
                _ => input[i - offset],
            }
        };

        while self.position + 1.0 < len as f64 {
            let index = self.position.floor() as usize;
            let frac = (self.position - index as f64) as f32;
            out.push(at(index) * (1.0 - frac) + at(index + 1) * frac);
            self.position += step;
        }

        // Re-base so the carried sample becomes index 0 of the next block
        self.position -= (len - 1) as f64;
        self.carry = input.last().copied();
    }

    /// Resample a complete signal into exactly `frames` samples
    ///
    /// Used for whole playback units, whose length on the device timeline is
    /// fixed by their start and end times. Reads past the end of the input hold the last sample, so the result
    /// never ends early when rounding asks for one more frame.
    pub fn resample_exact(samples: &[f32], from_rate: u32, to_rate: u32, frames: usize) -> Vec<f32> {
        let Some(&last) = samples.last() else {
            return vec![0.0; frames];
        };
        let step = from_rate.max(1) as f64 / to_rate.max(1) as f64;

        (0..frames)
            .map(|i| {
                let position = i as f64 * step;
                let index = position.floor() as usize;
                if index + 1 >= samples.len() {
                    return last;
                }
                let frac = (position - index as f64) as f32;
                samples[index] * (1.0 - frac) + samples[index + 1] * frac
            })
            .collect()
    }
}

/// Turns arbitrary device blocks into fixed-size mono frames
#[derive(Debug, Clone)]
pub struct Framer {
    frame_size: usize,
    target_rate: u32,
    resampler: Option<LinearResampler>,
    pending: Vec<f32>,
}

impl Framer {
    pub fn new(target_rate: u32, frame_size: usize) -> Self {
        Self {
            frame_size: frame_size.max(1),
            target_rate,
            resampler: None,
            pending: Vec::with_capacity(frame_size),
        }
    }

    /// Feed one interleaved device block; returns every frame it completed
    pub fn push(&mut self, samples: &[f32], sample_rate: u32, channels: u16) -> Vec<Vec<f32>> {
        let mono = downmix_to_mono(samples, channels);

        if self
            .resampler
            .as_ref()
            .map_or(true, |r| r.from_rate != sample_rate)
        {
            self.resampler = Some(LinearResampler::new(sample_rate, self.target_rate));
        }
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.process(&mono, &mut self.pending);
        }

        let mut frames = Vec::new();
        while self.pending.len() >= self.frame_size {
            let rest = self.pending.split_off(self.frame_size);
            frames.push(std::mem::replace(&mut self.pending, rest));
        }
        frames
    }

    /// Samples waiting for the next frame
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
