//! Wire formats: event command codes and the DoF streaming codec.
//!
//! Event messages are one request byte followed by an optional payload;
//! the reply echoes the request code on success and is `0x00` on
//! refusal. Streaming messages carry a record count byte followed by
//! fixed 29-byte DoF records:
//!
//! ```text
//! byte 0      N (records in this message)
//! per record  index u8, then 7 × f32 LE:
//!             position, velocity, force, acceleration,
//!             inertia, stiffness, damping
//! ```

use static_assertions::const_assert;

use exo_common::consts::MAX_MESSAGE_LENGTH;
use exo_common::types::DofVariables;

/// Reply byte signalling a refused request.
pub const REPLY_REFUSED: u8 = 0x00;

/// Single-byte request codes of the event channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RequestCode {
    /// List available robot configurations.
    ListConfigs = 1,
    /// Describe the current configuration (id, axes, joints).
    GetConfig = 2,
    /// Load a configuration by name (payload: name).
    SetConfig = 3,
    /// Set the user name for sample logging (payload: name).
    SetUser = 4,
    /// Stop the control thread and power the robot down.
    Disable = 5,
    /// Power the robot up and start the control thread.
    Enable = 6,
    /// Fully compliant state.
    Passivate = 7,
    /// Offset measurement state.
    Offset = 8,
    /// Range calibration state.
    Calibrate = 9,
    /// Normal closed-loop operation.
    Operate = 10,
    /// Controller-specific preparation state.
    Preprocess = 11,
    /// Clear errors and calibration; also sent unsolicited by the server
    /// on a hardware fault.
    Reset = 12,
}

impl RequestCode {
    /// Decode a request byte.
    pub const fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            1 => Self::ListConfigs,
            2 => Self::GetConfig,
            3 => Self::SetConfig,
            4 => Self::SetUser,
            5 => Self::Disable,
            6 => Self::Enable,
            7 => Self::Passivate,
            8 => Self::Offset,
            9 => Self::Calibrate,
            10 => Self::Operate,
            11 => Self::Preprocess,
            12 => Self::Reset,
            _ => return None,
        })
    }
}

/// Wire size of one DoF record: index byte + 7 single-precision floats.
pub const DOF_RECORD_SIZE: usize = 1 + 7 * 4;

/// Records that fit one streaming message after the count byte.
pub const MAX_DOF_RECORDS: usize = (MAX_MESSAGE_LENGTH - 1) / DOF_RECORD_SIZE;

const_assert!(DOF_RECORD_SIZE == 29);
const_assert!(MAX_DOF_RECORDS >= 16);

/// Streaming message buffer, bounded by the IPC message length.
pub type Frame = heapless::Vec<u8, MAX_MESSAGE_LENGTH>;

/// Start a streaming frame: zero records.
pub fn begin_frame(frame: &mut Frame) {
    frame.clear();
    // One count byte always fits an empty frame.
    let _ = frame.push(0);
}

/// Number of records in a frame under construction.
pub fn record_count(frame: &Frame) -> u8 {
    frame.first().copied().unwrap_or(0)
}

/// Append one DoF record; false when the frame is full.
pub fn push_record(frame: &mut Frame, index: u8, variables: &DofVariables) -> bool {
    if frame.is_empty() || frame.len() + DOF_RECORD_SIZE > MAX_MESSAGE_LENGTH {
        return false;
    }
    let _ = frame.push(index);
    for value in [
        variables.position,
        variables.velocity,
        variables.force,
        variables.acceleration,
        variables.inertia,
        variables.stiffness,
        variables.damping,
    ] {
        let _ = frame.extend_from_slice(&(value as f32).to_le_bytes());
    }
    frame[0] = frame[0].wrapping_add(1);
    true
}

/// Iterator over the records of a received streaming message.
///
/// Truncated trailing records are dropped silently; indices are not
/// validated here (the consumer skips out-of-range ones).
pub struct RecordIter<'a> {
    data: &'a [u8],
    remaining: usize,
    offset: usize,
}

impl<'a> RecordIter<'a> {
    /// Parse a raw datagram.
    pub fn new(data: &'a [u8]) -> Self {
        let remaining = data.first().copied().unwrap_or(0) as usize;
        Self {
            data,
            remaining,
            offset: 1,
        }
    }
}

impl Iterator for RecordIter<'_> {
    type Item = (u8, DofVariables);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 || self.offset + DOF_RECORD_SIZE > self.data.len() {
            return None;
        }
        let index = self.data[self.offset];
        let mut fields = [0.0f64; 7];
        for (slot, field) in fields.iter_mut().enumerate() {
            let at = self.offset + 1 + slot * 4;
            let raw: [u8; 4] = self.data[at..at + 4].try_into().ok()?;
            *field = f32::from_le_bytes(raw) as f64;
        }
        self.offset += DOF_RECORD_SIZE;
        self.remaining -= 1;
        Some((
            index,
            DofVariables {
                position: fields[0],
                velocity: fields[1],
                force: fields[2],
                acceleration: fields[3],
                inertia: fields[4],
                stiffness: fields[5],
                damping: fields[6],
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(seed: f32) -> DofVariables {
        DofVariables {
            position: (seed + 0.1) as f64,
            velocity: (seed + 0.2) as f64,
            force: (seed + 0.3) as f64,
            acceleration: (seed + 0.4) as f64,
            inertia: (seed + 0.5) as f64,
            stiffness: (seed + 0.6) as f64,
            damping: (seed + 0.7) as f64,
        }
    }

    #[test]
    fn roundtrip_is_identity_for_f32_values() {
        let mut frame = Frame::new();
        begin_frame(&mut frame);
        for index in 0..3u8 {
            assert!(push_record(&mut frame, index, &sample(index as f32)));
        }
        assert_eq!(record_count(&frame), 3);
        assert_eq!(frame.len(), 1 + 3 * DOF_RECORD_SIZE);

        let records: Vec<_> = RecordIter::new(&frame).collect();
        assert_eq!(records.len(), 3);
        for (index, variables) in &records {
            let expected = sample(*index as f32);
            assert_eq!(variables.position, expected.position);
            assert_eq!(variables.damping, expected.damping);
        }
    }

    #[test]
    fn extreme_f32_values_survive() {
        let extremes = DofVariables {
            position: f32::MAX as f64,
            velocity: f32::MIN_POSITIVE as f64,
            force: -0.0,
            acceleration: f32::MIN as f64,
            inertia: 1.0e-30f32 as f64,
            stiffness: 0.0,
            damping: -1.5,
        };
        let mut frame = Frame::new();
        begin_frame(&mut frame);
        assert!(push_record(&mut frame, 255, &extremes));
        let (index, decoded) = RecordIter::new(&frame).next().unwrap();
        assert_eq!(index, 255);
        assert_eq!(decoded.position, extremes.position);
        assert_eq!(decoded.acceleration, extremes.acceleration);
        assert_eq!(decoded.inertia, extremes.inertia);
    }

    #[test]
    fn frame_capacity_is_bounded() {
        let mut frame = Frame::new();
        begin_frame(&mut frame);
        for index in 0..MAX_DOF_RECORDS {
            assert!(push_record(&mut frame, index as u8, &sample(0.0)));
        }
        assert!(!push_record(&mut frame, 99, &sample(0.0)));
        assert_eq!(record_count(&frame), MAX_DOF_RECORDS as u8);
        assert!(frame.len() <= MAX_MESSAGE_LENGTH);
    }

    #[test]
    fn empty_message_yields_no_records() {
        assert_eq!(RecordIter::new(&[]).count(), 0);
        assert_eq!(RecordIter::new(&[0]).count(), 0);
    }

    #[test]
    fn truncated_records_are_dropped() {
        let mut frame = Frame::new();
        begin_frame(&mut frame);
        push_record(&mut frame, 0, &sample(1.0));
        // Claim two records but provide one.
        frame[0] = 2;
        assert_eq!(RecordIter::new(&frame).count(), 1);
    }

    #[test]
    fn request_codes_roundtrip() {
        for raw in 1..=12u8 {
            let code = RequestCode::from_u8(raw).unwrap();
            assert_eq!(code as u8, raw);
        }
        assert!(RequestCode::from_u8(0).is_none());
        assert!(RequestCode::from_u8(13).is_none());
    }

    #[test]
    fn wire_order_is_position_velocity_force() {
        let mut frame = Frame::new();
        begin_frame(&mut frame);
        push_record(
            &mut frame,
            0,
            &DofVariables {
                position: 1.0,
                velocity: 2.0,
                force: 3.0,
                acceleration: 4.0,
                ..DofVariables::default()
            },
        );
        let floats: Vec<f32> = frame[2..]
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes(chunk.try_into().unwrap()))
            .collect();
        assert_eq!(&floats[..4], &[1.0, 2.0, 3.0, 4.0]);
    }
}
