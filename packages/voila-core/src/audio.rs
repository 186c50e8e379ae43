//! Audio transcoding between the telephony leg and the voice-agent leg.
//!
//! The telephony peer speaks µ-law at 8 kHz; the agent speaks 16-bit linear
//! PCM at 16 kHz. Conversions here are pure functions over byte buffers:
//! G.711 µ-law companding and a linear-interpolation rate converter.
//!
//! All functions are infallible at the type level: a malformed buffer yields
//! an empty result and an error log entry, never a panic. The resampler is
//! stateless per frame; the short transients this produces at frame
//! boundaries are accepted.

/// G.711 encoder bias added before segment search.
const BIAS: i32 = 0x84;
/// Clip level for linear input to the µ-law encoder.
const CLIP: i32 = 32_635;

/// Segment lookup: index by (biased magnitude >> 7), yields the exponent.
const SEG_LUT: [u8; 256] = {
    let mut lut = [7u8; 256];
    let mut i = 0;
    while i < 256 {
        lut[i] = if i < 2 {
            0
        } else if i < 4 {
            1
        } else if i < 8 {
            2
        } else if i < 16 {
            3
        } else if i < 32 {
            4
        } else if i < 64 {
            5
        } else if i < 128 {
            6
        } else {
            7
        };
        i += 1;
    }
    lut
};

/// Encodes one 16-bit linear sample as a µ-law byte.
fn encode_sample(pcm: i16) -> u8 {
    let sign: u8 = if pcm < 0 { 0x80 } else { 0x00 };
    let mut magnitude = (pcm as i32).abs().min(CLIP);
    magnitude += BIAS;

    let exponent = SEG_LUT[(magnitude >> 7) as usize & 0xFF];
    let mantissa = ((magnitude >> (exponent + 3)) & 0x0F) as u8;

    !(sign | (exponent << 4) | mantissa)
}

/// Decodes one µ-law byte into a 16-bit linear sample.
fn decode_sample(mulaw: u8) -> i16 {
    let mulaw = !mulaw;
    let sign = mulaw & 0x80;
    let exponent = (mulaw >> 4) & 0x07;
    let mantissa = (mulaw & 0x0F) as i32;

    let magnitude = (((mantissa << 3) + BIAS) << exponent) - BIAS;
    if sign != 0 {
        (-magnitude) as i16
    } else {
        magnitude as i16
    }
}

/// Converts a µ-law byte buffer into 16-bit little-endian linear PCM.
///
/// Output is always twice the input length; an empty input yields an empty
/// output.
pub fn mulaw_to_linear(mulaw: &[u8]) -> Vec<u8> {
    let mut pcm = Vec::with_capacity(mulaw.len() * 2);
    for &byte in mulaw {
        pcm.extend_from_slice(&decode_sample(byte).to_le_bytes());
    }
    pcm
}

/// Converts a 16-bit little-endian linear PCM buffer into µ-law.
///
/// A buffer with an odd length cannot hold whole samples; it yields an empty
/// result and an error log entry.
pub fn linear_to_mulaw(pcm: &[u8]) -> Vec<u8> {
    if pcm.len() % 2 != 0 {
        log::error!("[Audio] PCM -> mu-law conversion failed: odd buffer length {}", pcm.len());
        return Vec::new();
    }
    let mut mulaw = Vec::with_capacity(pcm.len() / 2);
    for chunk in pcm.chunks_exact(2) {
        let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
        mulaw.push(encode_sample(sample));
    }
    mulaw
}

/// Resamples 16-bit little-endian PCM between sample rates.
///
/// Linear interpolation over interleaved frames. Called once per 20 ms frame
/// with no carried residual. `sample_width` must be 2; anything else yields
/// an empty result and an error log entry. `from_rate == to_rate` returns the
/// input unchanged.
pub fn resample(
    pcm: &[u8],
    from_rate: u32,
    to_rate: u32,
    channels: u16,
    sample_width: u16,
) -> Vec<u8> {
    if sample_width != 2 {
        log::error!("[Audio] Resample failed: unsupported sample width {}", sample_width);
        return Vec::new();
    }
    if channels == 0 || from_rate == 0 || to_rate == 0 {
        log::error!(
            "[Audio] Resample failed: invalid parameters (channels={}, {} Hz -> {} Hz)",
            channels,
            from_rate,
            to_rate
        );
        return Vec::new();
    }
    if from_rate == to_rate {
        return pcm.to_vec();
    }

    let frame_bytes = channels as usize * 2;
    if pcm.len() % frame_bytes != 0 {
        log::error!(
            "[Audio] Resample failed: buffer length {} not a multiple of frame size {}",
            pcm.len(),
            frame_bytes
        );
        return Vec::new();
    }

    let in_frames = pcm.len() / frame_bytes;
    if in_frames == 0 {
        return Vec::new();
    }

    let out_frames =
        ((in_frames as u64 * to_rate as u64 + from_rate as u64 / 2) / from_rate as u64) as usize;
    let mut out = Vec::with_capacity(out_frames * frame_bytes);

    let read_sample = |frame: usize, ch: usize| -> i16 {
        let offset = frame * frame_bytes + ch * 2;
        i16::from_le_bytes([pcm[offset], pcm[offset + 1]])
    };

    for out_idx in 0..out_frames {
        // Source position in fixed point against the input frame grid.
        let pos = out_idx as u64 * from_rate as u64;
        let in_idx = (pos / to_rate as u64) as usize;
        let frac = (pos % to_rate as u64) as i64;

        for ch in 0..channels as usize {
            let a = read_sample(in_idx.min(in_frames - 1), ch) as i64;
            let b = read_sample((in_idx + 1).min(in_frames - 1), ch) as i64;
            let sample = a + (b - a) * frac / to_rate as i64;
            out.extend_from_slice(&(sample as i16).to_le_bytes());
        }
    }

    out
}
