// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! TI mmWave demo output frames.
//!
//! A frame starts with an 8-byte magic word followed by a 40-byte header
//! (magic included) and `num_tlvs` type-length-value records.  Only the
//! detected points TLV is decoded, every other TLV is skipped by length.
//! All multi-byte fields are little-endian.

use std::{cmp::min, fmt};
use tracing::{instrument, trace};

/// Frame synchronisation marker emitted by the sensor before every header.
pub const MAGIC_WORD: [u8; 8] = [0x02, 0x01, 0x04, 0x03, 0x06, 0x05, 0x08, 0x07];

/// Detections at or below this range (cm) are discarded.
pub const RANGE_MIN_CM: f64 = 5.0;

/// Detections above this range (cm) are discarded.
pub const RANGE_MAX_CM: f64 = 5000.0;

/// Radial velocity represented by one doppler bin in m/s.
pub const DOPPLER_MPS_PER_BIN: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// The slice ended before the structure it should contain.
    UnexpectedEndOfSlice(usize),
    /// The slice does not start with the magic word.
    MarkerMismatch,
    /// The header reports no detected objects.
    NoDetectedObjects,
    /// The header declares a packet longer than the bytes available.
    TruncatedPacket(u32, usize),
}

impl std::error::Error for FrameError {}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter) -> std::fmt::Result {
        match self {
            FrameError::UnexpectedEndOfSlice(size) => {
                write!(f, "unexpected end of slice: {}", size)
            }
            FrameError::MarkerMismatch => write!(f, "magic word mismatch"),
            FrameError::NoDetectedObjects => write!(f, "no detected objects"),
            FrameError::TruncatedPacket(expect, len) => {
                write!(f, "truncated packet [{}/{}]", len, expect)
            }
        }
    }
}

#[inline]
fn read_u16(slice: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([slice[offset], slice[offset + 1]])
}

#[inline]
fn read_i16(slice: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([slice[offset], slice[offset + 1]])
}

#[inline]
fn read_u32(slice: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        slice[offset],
        slice[offset + 1],
        slice[offset + 2],
        slice[offset + 3],
    ])
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FrameHeader {
    pub version: u32,
    pub total_packet_length: u32,
    pub platform: u32,
    pub frame_number: u32,
    pub time_cpu_cycles: u32,
    pub num_detected_objects: u32,
    pub num_tlvs: u32,
    pub subframe_number: u32,
}

impl FrameHeader {
    /// Length of the frame header in bytes, magic word included.
    pub const LEN: usize = 40;
}

/// A slice starting with a frame header.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FrameHeaderSlice<'a> {
    slice: &'a [u8],
}

impl<'a> FrameHeaderSlice<'a> {
    pub fn from_slice(slice: &'a [u8]) -> Result<FrameHeaderSlice<'a>, FrameError> {
        if slice.len() < FrameHeader::LEN {
            return Err(FrameError::UnexpectedEndOfSlice(slice.len()));
        }

        if slice[..MAGIC_WORD.len()] != MAGIC_WORD {
            return Err(FrameError::MarkerMismatch);
        }

        Ok(FrameHeaderSlice { slice })
    }

    pub fn to_header(&self) -> FrameHeader {
        FrameHeader {
            version: read_u32(self.slice, 8),
            total_packet_length: self.total_packet_length(),
            platform: read_u32(self.slice, 16),
            frame_number: self.frame_number(),
            time_cpu_cycles: read_u32(self.slice, 24),
            num_detected_objects: self.num_detected_objects(),
            num_tlvs: self.num_tlvs(),
            subframe_number: read_u32(self.slice, 36),
        }
    }

    /// Returns the packet length in bytes, header included.
    #[inline]
    pub fn total_packet_length(&self) -> u32 {
        read_u32(self.slice, 12)
    }

    #[inline]
    pub fn frame_number(&self) -> u32 {
        read_u32(self.slice, 20)
    }

    #[inline]
    pub fn num_detected_objects(&self) -> u32 {
        read_u32(self.slice, 28)
    }

    #[inline]
    pub fn num_tlvs(&self) -> u32 {
        read_u32(self.slice, 32)
    }

    /// Returns the bytes following the header, which hold the TLVs.
    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        &self.slice[FrameHeader::LEN..]
    }
}

/// TLV record types of the mmWave SDK demo output.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TlvType {
    DetectedPoints,
    RangeProfile,
    NoiseProfile,
    AzimuthStaticHeatMap,
    RangeDopplerHeatMap,
    Stats,
    Unknown(u32),
}

impl From<u32> for TlvType {
    fn from(value: u32) -> Self {
        match value {
            1 => TlvType::DetectedPoints,
            2 => TlvType::RangeProfile,
            3 => TlvType::NoiseProfile,
            4 => TlvType::AzimuthStaticHeatMap,
            5 => TlvType::RangeDopplerHeatMap,
            6 => TlvType::Stats,
            other => TlvType::Unknown(other),
        }
    }
}

impl From<TlvType> for u32 {
    fn from(value: TlvType) -> Self {
        match value {
            TlvType::DetectedPoints => 1,
            TlvType::RangeProfile => 2,
            TlvType::NoiseProfile => 3,
            TlvType::AzimuthStaticHeatMap => 4,
            TlvType::RangeDopplerHeatMap => 5,
            TlvType::Stats => 6,
            TlvType::Unknown(other) => other,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TlvHeader {
    pub tlv_type: TlvType,
    pub length: u32,
}

impl TlvHeader {
    /// Length of the TLV type and length fields in bytes.
    pub const LEN: usize = 8;
}

/// A slice starting with a TLV sub-header.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TlvHeaderSlice<'a> {
    slice: &'a [u8],
}

impl<'a> TlvHeaderSlice<'a> {
    pub fn from_slice(slice: &'a [u8]) -> Result<TlvHeaderSlice<'a>, FrameError> {
        if slice.len() < TlvHeader::LEN {
            return Err(FrameError::UnexpectedEndOfSlice(slice.len()));
        }

        Ok(TlvHeaderSlice { slice })
    }

    pub fn to_header(&self) -> TlvHeader {
        TlvHeader {
            tlv_type: self.tlv_type(),
            length: self.length(),
        }
    }

    #[inline]
    pub fn tlv_type(&self) -> TlvType {
        TlvType::from(read_u32(self.slice, 0))
    }

    /// Returns the declared payload length in bytes.
    #[inline]
    pub fn length(&self) -> u32 {
        read_u32(self.slice, 4)
    }

    /// Returns the payload, or an error if the declared length runs past
    /// the end of the slice.
    #[inline]
    pub fn payload(&self) -> Result<&'a [u8], FrameError> {
        let end = TlvHeader::LEN as u64 + self.length() as u64;
        if end > self.slice.len() as u64 {
            return Err(FrameError::UnexpectedEndOfSlice(self.slice.len()));
        }

        Ok(&self.slice[TlvHeader::LEN..end as usize])
    }
}

/// Raw detected point as transmitted, positions in Q-format.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PointRecord {
    pub range_idx: u16,
    pub doppler_idx: i16,
    pub peak_val: u16,
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

impl PointRecord {
    /// Length of one detected point record in bytes.
    pub const LEN: usize = 12;

    /// Reads a record from the first [`PointRecord::LEN`] bytes of `data`.
    pub fn from_bytes(data: &[u8]) -> PointRecord {
        PointRecord {
            range_idx: read_u16(data, 0),
            doppler_idx: read_i16(data, 2),
            peak_val: read_u16(data, 4),
            x: read_i16(data, 6),
            y: read_i16(data, 8),
            z: read_i16(data, 10),
        }
    }

    pub fn to_bytes(&self) -> [u8; PointRecord::LEN] {
        let mut out = [0u8; PointRecord::LEN];
        out[0..2].copy_from_slice(&self.range_idx.to_le_bytes());
        out[2..4].copy_from_slice(&self.doppler_idx.to_le_bytes());
        out[4..6].copy_from_slice(&self.peak_val.to_le_bytes());
        out[6..8].copy_from_slice(&self.x.to_le_bytes());
        out[8..10].copy_from_slice(&self.y.to_le_bytes());
        out[10..12].copy_from_slice(&self.z.to_le_bytes());
        out
    }
}

/// A slice containing the payload of a detected points TLV.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DetectedPointsSlice<'a> {
    slice: &'a [u8],
}

impl<'a> DetectedPointsSlice<'a> {
    /// Length of the point count and Q-format fields in bytes.
    pub const HEADER_LEN: usize = 4;

    pub fn from_slice(slice: &'a [u8]) -> Result<DetectedPointsSlice<'a>, FrameError> {
        if slice.len() < Self::HEADER_LEN {
            return Err(FrameError::UnexpectedEndOfSlice(slice.len()));
        }

        Ok(DetectedPointsSlice { slice })
    }

    #[inline]
    pub fn num_points(&self) -> u16 {
        read_u16(self.slice, 0)
    }

    /// Returns the number of fractional bits of the x/y/z fields.
    #[inline]
    pub fn xyz_q_format(&self) -> u16 {
        read_u16(self.slice, 2)
    }

    /// Returns the multiplier converting Q-format positions to meters.
    #[inline]
    pub fn q_scale(&self) -> f64 {
        q_scale(self.xyz_q_format())
    }

    /// Iterates over the complete records in the payload.  A trailing
    /// partial record is ignored.
    pub fn records(&self) -> impl Iterator<Item = PointRecord> + 'a {
        self.slice[Self::HEADER_LEN..]
            .chunks_exact(PointRecord::LEN)
            .map(PointRecord::from_bytes)
    }
}

/// Power-of-two scale for a Q-format with `q` fractional bits.
#[inline]
pub fn q_scale(q: u16) -> f64 {
    if q > 0 {
        2f64.powi(-(q as i32))
    } else {
        1.0
    }
}

/// One decoded detection.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DetectedObject {
    pub source_id: u32,
    pub frame_number: u32,
    /// Azimuth in degrees, counter-clockwise from the x axis.
    pub angle_deg: f64,
    /// Planar range in centimeters.
    pub range_cm: f64,
    pub radial_velocity_mps: f64,
    pub x_m: f64,
    pub y_m: f64,
    pub z_m: f64,
    pub peak_amplitude: u16,
    pub range_bin_index: u16,
    pub doppler_bin_index: i16,
}

impl DetectedObject {
    /// Converts a raw record, returning `None` when the planar range falls
    /// outside `(RANGE_MIN_CM, RANGE_MAX_CM]`.
    pub fn from_record(
        source_id: u32,
        frame_number: u32,
        record: &PointRecord,
        scale: f64,
    ) -> Option<DetectedObject> {
        let x_m = record.x as f64 * scale;
        let y_m = record.y as f64 * scale;
        let z_m = record.z as f64 * scale;

        let range_cm = (x_m * x_m + y_m * y_m).sqrt() * 100.0;
        if !(range_cm > RANGE_MIN_CM && range_cm <= RANGE_MAX_CM) {
            return None;
        }

        Some(DetectedObject {
            source_id,
            frame_number,
            angle_deg: y_m.atan2(x_m).to_degrees(),
            range_cm,
            radial_velocity_mps: record.doppler_idx as f64 * DOPPLER_MPS_PER_BIN,
            x_m,
            y_m,
            z_m,
            peak_amplitude: record.peak_val,
            range_bin_index: record.range_idx,
            doppler_bin_index: record.doppler_idx,
        })
    }

    /// Re-quantizes the object into a raw record with `xyz_q_format`
    /// fractional bits.
    pub fn to_record(&self, xyz_q_format: u16) -> PointRecord {
        let quantize = |v: f64| (v / q_scale(xyz_q_format)).round() as i16;
        PointRecord {
            range_idx: self.range_bin_index,
            doppler_idx: self.doppler_bin_index,
            peak_val: self.peak_amplitude,
            x: quantize(self.x_m),
            y: quantize(self.y_m),
            z: quantize(self.z_m),
        }
    }
}

/// Where scanning resumes after a candidate frame.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ResyncPolicy {
    /// Skip the header after a parsed frame, but retry one byte past the
    /// marker when the candidate was abandoned.
    #[default]
    NextByte,
    /// Always skip a full header past the marker.  Matches the behaviour
    /// of existing recording tools byte for byte.
    SkipHeader,
}

/// Self-synchronising frame decoder.  Holds no state between calls.
#[derive(Copy, Clone, Debug, Default)]
pub struct FrameDecoder {
    resync: ResyncPolicy,
}

impl FrameDecoder {
    pub fn new(resync: ResyncPolicy) -> FrameDecoder {
        FrameDecoder { resync }
    }

    pub fn resync(&self) -> ResyncPolicy {
        self.resync
    }

    /// Decodes every frame found in `buf`, in encounter order.  Malformed
    /// or truncated data yields fewer objects, never an error.
    #[instrument(skip_all, level = "trace", fields(len = buf.len(), source_id = source_id))]
    pub fn decode(&self, buf: &[u8], source_id: u32) -> Vec<DetectedObject> {
        let mut objects = Vec::new();
        let mut pos = 0;

        while pos < buf.len() {
            let start = match find_marker(&buf[pos..]) {
                Some(offset) => pos + offset,
                None => break,
            };

            pos = match parse_frame(&buf[start..], source_id, &mut objects) {
                Ok(()) => start + FrameHeader::LEN,
                Err(err) => {
                    trace!(offset = start, "abandoned frame: {}", err);
                    match self.resync {
                        ResyncPolicy::NextByte => start + 1,
                        ResyncPolicy::SkipHeader => start + FrameHeader::LEN,
                    }
                }
            };
        }

        objects
    }
}

/// Decodes `buf` with the default [`ResyncPolicy`].
pub fn decode(buf: &[u8], source_id: u32) -> Vec<DetectedObject> {
    FrameDecoder::default().decode(buf, source_id)
}

fn find_marker(buf: &[u8]) -> Option<usize> {
    buf.windows(MAGIC_WORD.len())
        .position(|window| window == MAGIC_WORD)
}

fn parse_frame(
    slice: &[u8],
    source_id: u32,
    objects: &mut Vec<DetectedObject>,
) -> Result<(), FrameError> {
    let header = FrameHeaderSlice::from_slice(slice)?;

    let expected = header.num_detected_objects();
    if expected == 0 {
        return Err(FrameError::NoDetectedObjects);
    }

    let total = header.total_packet_length();
    if (slice.len() as u64) < total as u64 {
        return Err(FrameError::TruncatedPacket(total, slice.len()));
    }

    let frame_number = header.frame_number();
    let mut tlvs = header.payload();

    for index in 0..header.num_tlvs() {
        let tlv = match TlvHeaderSlice::from_slice(tlvs) {
            Ok(tlv) => tlv,
            Err(err) => {
                trace!(frame_number, index, "tlv header: {}", err);
                break;
            }
        };

        let payload = match tlv.payload() {
            Ok(payload) => payload,
            Err(err) => {
                trace!(frame_number, index, length = tlv.length(), "tlv payload: {}", err);
                break;
            }
        };

        if tlv.tlv_type() == TlvType::DetectedPoints {
            decode_points(payload, source_id, frame_number, expected, objects);
        }

        tlvs = &tlvs[TlvHeader::LEN + payload.len()..];
    }

    Ok(())
}

fn decode_points(
    payload: &[u8],
    source_id: u32,
    frame_number: u32,
    expected: u32,
    objects: &mut Vec<DetectedObject>,
) {
    let points = match DetectedPointsSlice::from_slice(payload) {
        Ok(points) => points,
        Err(err) => {
            trace!(frame_number, "detected points: {}", err);
            return;
        }
    };

    let limit = min(points.num_points() as u32, expected) as usize;
    let scale = points.q_scale();

    objects.extend(
        points
            .records()
            .take(limit)
            .filter_map(|record| DetectedObject::from_record(source_id, frame_number, &record, scale)),
    );
}

/// Encoder for synthetic frames, used to generate recordings and in tests.
#[derive(Clone, Debug, Default)]
pub struct FrameBuilder {
    frame_number: u32,
    xyz_q_format: u16,
    points: Vec<PointRecord>,
    tlvs: Vec<(u32, Vec<u8>)>,
    num_detected_objects: Option<u32>,
    total_packet_length: Option<u32>,
}

impl FrameBuilder {
    /// Version word reported by mmWave SDK 3.5 firmware.
    pub const VERSION: u32 = 0x0305_0004;
    /// Platform word of the AWR1843.
    pub const PLATFORM: u32 = 0x000A_1843;

    pub fn new(frame_number: u32) -> FrameBuilder {
        FrameBuilder {
            frame_number,
            ..Default::default()
        }
    }

    pub fn xyz_q_format(mut self, q: u16) -> FrameBuilder {
        self.xyz_q_format = q;
        self
    }

    /// Appends a point to the detected points TLV.
    pub fn point(mut self, record: PointRecord) -> FrameBuilder {
        self.points.push(record);
        self
    }

    /// Appends an opaque TLV after the detected points TLV.
    pub fn tlv(mut self, tlv_type: u32, payload: Vec<u8>) -> FrameBuilder {
        self.tlvs.push((tlv_type, payload));
        self
    }

    /// Overrides the header object count, which defaults to the number of
    /// points.
    pub fn num_detected_objects(mut self, count: u32) -> FrameBuilder {
        self.num_detected_objects = Some(count);
        self
    }

    /// Overrides the header packet length, which defaults to the encoded
    /// length.
    pub fn total_packet_length(mut self, length: u32) -> FrameBuilder {
        self.total_packet_length = Some(length);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut tlvs: Vec<(u32, Vec<u8>)> = Vec::with_capacity(self.tlvs.len() + 1);

        if !self.points.is_empty() {
            let mut payload =
                Vec::with_capacity(DetectedPointsSlice::HEADER_LEN + self.points.len() * PointRecord::LEN);
            payload.extend_from_slice(&(self.points.len() as u16).to_le_bytes());
            payload.extend_from_slice(&self.xyz_q_format.to_le_bytes());
            for point in &self.points {
                payload.extend_from_slice(&point.to_bytes());
            }
            tlvs.push((TlvType::DetectedPoints.into(), payload));
        }
        tlvs.extend(self.tlvs.iter().cloned());

        let length = FrameHeader::LEN
            + tlvs
                .iter()
                .map(|(_, payload)| TlvHeader::LEN + payload.len())
                .sum::<usize>();

        let header = [
            Self::VERSION,
            self.total_packet_length.unwrap_or(length as u32),
            Self::PLATFORM,
            self.frame_number,
            0,
            self.num_detected_objects
                .unwrap_or(self.points.len() as u32),
            tlvs.len() as u32,
            0,
        ];

        let mut out = Vec::with_capacity(length);
        out.extend_from_slice(&MAGIC_WORD);
        for word in header {
            out.extend_from_slice(&word.to_le_bytes());
        }
        for (tlv_type, payload) in &tlvs {
            out.extend_from_slice(&tlv_type.to_le_bytes());
            out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            out.extend_from_slice(payload);
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(x: i16, y: i16) -> PointRecord {
        PointRecord {
            range_idx: 40,
            doppler_idx: -3,
            peak_val: 1200,
            x,
            y,
            z: 0,
        }
    }

    #[test]
    fn test_empty_and_unsynced() {
        assert!(decode(&[], 0).is_empty());
        assert!(decode(&[0u8; 7], 0).is_empty());
        assert!(decode(&[0xAAu8; 4096], 0).is_empty());

        // A partial marker at the end is not a frame.
        let mut buf = vec![0u8; 64];
        buf.extend_from_slice(&MAGIC_WORD[..6]);
        assert!(decode(&buf, 0).is_empty());
    }

    #[test]
    fn test_header_fields() {
        let frame = FrameBuilder::new(77)
            .xyz_q_format(8)
            .point(point(2560, 0))
            .build();
        let header = FrameHeaderSlice::from_slice(&frame).unwrap().to_header();

        assert_eq!(
            header,
            FrameHeader {
                version: FrameBuilder::VERSION,
                total_packet_length: frame.len() as u32,
                platform: FrameBuilder::PLATFORM,
                frame_number: 77,
                time_cpu_cycles: 0,
                num_detected_objects: 1,
                num_tlvs: 1,
                subframe_number: 0,
            }
        );

        let tlv = TlvHeaderSlice::from_slice(&frame[FrameHeader::LEN..])
            .unwrap()
            .to_header();
        assert_eq!(tlv.tlv_type, TlvType::DetectedPoints);
        assert_eq!(tlv.length as usize, 4 + PointRecord::LEN);
    }

    #[test]
    fn test_header_errors() {
        assert_eq!(
            FrameHeaderSlice::from_slice(&MAGIC_WORD),
            Err(FrameError::UnexpectedEndOfSlice(8))
        );
        assert_eq!(
            FrameHeaderSlice::from_slice(&[0u8; 40]),
            Err(FrameError::MarkerMismatch)
        );
        assert_eq!(
            TlvHeaderSlice::from_slice(&[1, 0, 0]),
            Err(FrameError::UnexpectedEndOfSlice(3))
        );
    }

    #[test]
    fn test_ten_meters() {
        let frame = FrameBuilder::new(5)
            .xyz_q_format(8)
            .point(point(2560, 0))
            .point(point(2560, 0))
            .num_detected_objects(2)
            .build();

        let objects = decode(&frame, 3);
        assert_eq!(objects.len(), 2);
        for obj in &objects {
            assert_eq!(obj.source_id, 3);
            assert_eq!(obj.frame_number, 5);
            assert_eq!(obj.x_m, 10.0);
            assert_eq!(obj.y_m, 0.0);
            assert_eq!(obj.range_cm, 1000.0);
            assert_eq!(obj.angle_deg, 0.0);
            assert!((obj.radial_velocity_mps + 0.3).abs() < 1e-12);
            assert_eq!(obj.peak_amplitude, 1200);
            assert_eq!(obj.range_bin_index, 40);
            assert_eq!(obj.doppler_bin_index, -3);
        }
    }

    #[test]
    fn test_polar_conversion() {
        // 1m along both axes with 7 fractional bits.
        let frame = FrameBuilder::new(1)
            .xyz_q_format(7)
            .point(PointRecord {
                z: -64,
                ..point(128, 128)
            })
            .build();

        let objects = decode(&frame, 0);
        assert_eq!(objects.len(), 1);
        let obj = objects[0];
        assert!((obj.angle_deg - 45.0).abs() < 1e-9);
        assert!((obj.range_cm - 100.0 * 2f64.sqrt()).abs() < 1e-9);
        assert_eq!(obj.z_m, -0.5);
    }

    #[test]
    fn test_q_format_zero() {
        let frame = FrameBuilder::new(1).point(point(3, 4)).build();
        let objects = decode(&frame, 0);
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].range_cm, 500.0);
        assert_eq!(q_scale(0), 1.0);
        assert_eq!(q_scale(10), 1.0 / 1024.0);
    }

    #[test]
    fn test_range_band() {
        // 8/256 m = 3.125cm is below the floor, the neighbour is kept.
        let frame = FrameBuilder::new(9)
            .xyz_q_format(8)
            .point(point(8, 0))
            .point(point(0, 2560))
            .build();
        let objects = decode(&frame, 0);
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].range_cm, 1000.0);
        assert!((objects[0].angle_deg - 90.0).abs() < 1e-9);

        // 50m is the inclusive upper bound, anything beyond is dropped.
        let frame = FrameBuilder::new(9)
            .point(point(50, 0))
            .point(point(51, 0))
            .build();
        let objects = decode(&frame, 0);
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].range_cm, RANGE_MAX_CM);
    }

    #[test]
    fn test_no_detected_objects() {
        let frame = FrameBuilder::new(1)
            .xyz_q_format(8)
            .point(point(2560, 0))
            .num_detected_objects(0)
            .build();
        assert!(decode(&frame, 0).is_empty());
    }

    #[test]
    fn test_object_limit() {
        // The header count caps the number of points decoded.
        let frame = FrameBuilder::new(1)
            .xyz_q_format(8)
            .point(point(256, 0))
            .point(point(512, 0))
            .point(point(768, 0))
            .num_detected_objects(2)
            .build();
        let objects = decode(&frame, 0);
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].range_cm, 100.0);
        assert_eq!(objects[1].range_cm, 200.0);
    }

    #[test]
    fn test_truncated_packet() {
        let frame = FrameBuilder::new(1)
            .xyz_q_format(8)
            .point(point(2560, 0))
            .build();
        assert!(decode(&frame[..frame.len() - 1], 0).is_empty());

        let frame = FrameBuilder::new(1)
            .xyz_q_format(8)
            .point(point(2560, 0))
            .total_packet_length(4096)
            .build();
        assert!(decode(&frame, 0).is_empty());
    }

    #[test]
    fn test_oversized_tlv() {
        let mut frame = FrameBuilder::new(1)
            .xyz_q_format(8)
            .point(point(2560, 0))
            .build();
        // Declare a TLV payload longer than the buffer.
        frame[FrameHeader::LEN + 4..FrameHeader::LEN + 8].copy_from_slice(&10_000u32.to_le_bytes());
        assert!(decode(&frame, 0).is_empty());
    }

    #[test]
    fn test_unknown_tlv_skipped() {
        let frame = FrameBuilder::new(1)
            .tlv(3, vec![0xFF; 6])
            .tlv(0xDEAD, vec![])
            .build();
        // Detected points come after the opaque TLVs here.
        let points = FrameBuilder::new(1)
            .xyz_q_format(8)
            .point(point(2560, 0))
            .build();
        let mut tlvs = frame[FrameHeader::LEN..].to_vec();
        tlvs.extend_from_slice(&points[FrameHeader::LEN..]);

        let mut buf = frame[..FrameHeader::LEN].to_vec();
        buf[12..16].copy_from_slice(&((FrameHeader::LEN + tlvs.len()) as u32).to_le_bytes());
        buf[28..32].copy_from_slice(&1u32.to_le_bytes());
        buf[32..36].copy_from_slice(&3u32.to_le_bytes());
        buf.extend_from_slice(&tlvs);

        let objects = decode(&buf, 0);
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].range_cm, 1000.0);
    }

    #[test]
    fn test_partial_record() {
        let mut frame = FrameBuilder::new(1)
            .xyz_q_format(8)
            .point(point(256, 0))
            .point(point(512, 0))
            .build();
        // Shrink the TLV so the second record no longer fits.
        let length = (4 + PointRecord::LEN + 6) as u32;
        frame[FrameHeader::LEN + 4..FrameHeader::LEN + 8].copy_from_slice(&length.to_le_bytes());
        let objects = decode(&frame, 0);
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].range_cm, 100.0);
    }

    #[test]
    fn test_multiple_frames_misaligned() {
        let mut buf = vec![0x55, 0x02, 0x01, 0x04];
        for n in 0..3u32 {
            buf.extend(
                FrameBuilder::new(n)
                    .xyz_q_format(8)
                    .point(point(256 * (n as i16 + 1), 0))
                    .build(),
            );
            buf.extend_from_slice(&[0x13; 5]);
        }

        let objects = decode(&buf, 1);
        let frames: Vec<_> = objects.iter().map(|o| o.frame_number).collect();
        assert_eq!(frames, vec![0, 1, 2]);
        assert_eq!(objects[2].range_cm, 300.0);
    }

    #[test]
    fn test_split_across_chunks() {
        let frame = FrameBuilder::new(4)
            .xyz_q_format(8)
            .point(point(2560, 0))
            .build();
        let (head, tail) = frame.split_at(30);
        assert!(decode(head, 0).is_empty());
        assert!(decode(tail, 0).is_empty());
    }

    #[test]
    fn test_resync_policy() {
        // An abandoned candidate whose header span hides a real frame.
        let mut buf = MAGIC_WORD.to_vec();
        buf.extend_from_slice(&[0u8; 24]);
        buf.extend(
            FrameBuilder::new(2)
                .xyz_q_format(8)
                .point(point(2560, 0))
                .build(),
        );

        let next_byte = FrameDecoder::new(ResyncPolicy::NextByte).decode(&buf, 0);
        assert_eq!(next_byte.len(), 1);
        assert_eq!(next_byte[0].frame_number, 2);

        let skip_header = FrameDecoder::new(ResyncPolicy::SkipHeader).decode(&buf, 0);
        assert!(skip_header.is_empty());
    }

    #[test]
    fn test_fixed_point_round_trip() {
        for q in [0u16, 4, 8, 12] {
            let quantize = |v: f64| (v * 2f64.powi(q as i32)).round() as i16;
            let frame = FrameBuilder::new(1)
                .xyz_q_format(q)
                .point(PointRecord {
                    z: quantize(0.4),
                    ..point(quantize(3.7), quantize(-2.9))
                })
                .build();
            let first = decode(&frame, 0);
            assert_eq!(first.len(), 1);

            let record = first[0].to_record(q);
            let again = decode(
                &FrameBuilder::new(1).xyz_q_format(q).point(record).build(),
                0,
            );
            assert_eq!(again.len(), 1);

            let tolerance = q_scale(q) / 2.0;
            assert!((again[0].x_m - first[0].x_m).abs() <= tolerance);
            assert!((again[0].y_m - first[0].y_m).abs() <= tolerance);
            assert!((again[0].z_m - first[0].z_m).abs() <= tolerance);
            assert!((again[0].range_cm - first[0].range_cm).abs() <= tolerance * 200.0);
            assert_eq!(again[0].doppler_bin_index, first[0].doppler_bin_index);
        }
    }
}
