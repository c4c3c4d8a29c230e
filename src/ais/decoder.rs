//! AIVDM sentence decoder
//!
//! Decodes the NMEA 0183 AIS sentences arriving in UDP datagrams into
//! source-agnostic vessel updates. Handles checksum verification,
//! multi-fragment reassembly, and the 6-bit payload armor.
//!
//! Message coverage: 1/2/3/18/19 (position), 5/24 (static and voyage),
//! everything else — base stations (4), channel management (20/22), aids to
//! navigation, binary messages — surfaces as `Other` and is dropped by the
//! ingest contract. Malformed sentences are dropped silently; a counter
//! tracks them for debugging.

use std::collections::HashMap;

use crate::registry::VesselUpdate;
use crate::types::{Dimensions, LatLon};

/// One decoded AIS message.
#[derive(Debug, Clone, PartialEq)]
pub enum AisMessage {
    /// Position report (types 1, 2, 3, 18, 19).
    Position(VesselUpdate),
    /// Static / voyage data (types 5, 24; 19 carries both).
    Static(VesselUpdate),
    /// Anything the ingest contract does not consume.
    Other { msg_type: u8, mmsi: u32 },
}

impl AisMessage {
    /// The vessel update carried by consumable messages.
    pub fn into_update(self) -> Option<VesselUpdate> {
        match self {
            AisMessage::Position(u) | AisMessage::Static(u) => Some(u),
            AisMessage::Other { .. } => None,
        }
    }
}

#[derive(Debug)]
struct FragmentBuffer {
    parts: Vec<Option<String>>,
}

/// Stateful decoder; one per UDP station so fragment streams cannot
/// interleave across senders.
#[derive(Debug, Default)]
pub struct AisDecoder {
    fragments: HashMap<String, FragmentBuffer>,
    /// Sentences dropped at the decode boundary.
    pub malformed: u64,
}

impl AisDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one sentence. Returns a message when the sentence (or the
    /// fragment group it completes) decodes.
    pub fn decode_sentence(&mut self, line: &str) -> Option<AisMessage> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let Some(payload) = self.accept_sentence(line) else {
            return None;
        };
        match decode_payload(&payload) {
            Some(message) => Some(message),
            None => {
                self.malformed += 1;
                None
            }
        }
    }

    /// Validate framing and checksum; returns the complete payload once all
    /// fragments of a group have arrived.
    fn accept_sentence(&mut self, line: &str) -> Option<String> {
        let Some(fields) = checked_fields(line) else {
            self.malformed += 1;
            return None;
        };

        // fields: total, num, seq-id, channel, payload, fill
        let (Ok(total), Ok(num)) = (fields[0].parse::<u8>(), fields[1].parse::<u8>()) else {
            self.malformed += 1;
            return None;
        };
        if total == 0 || num == 0 || num > total {
            self.malformed += 1;
            return None;
        }
        let payload = fields[4].to_string();

        if total == 1 {
            return Some(payload);
        }

        // Bound memory: stale partial groups from lost fragments.
        if self.fragments.len() > 32 {
            self.fragments.clear();
        }

        let key = format!("{}/{}", fields[2], fields[3]);
        let buffer = self
            .fragments
            .entry(key.clone())
            .or_insert_with(|| FragmentBuffer { parts: vec![None; total as usize] });

        if buffer.parts.len() != total as usize {
            // Total changed mid-group; restart.
            buffer.parts = vec![None; total as usize];
        }
        buffer.parts[(num - 1) as usize] = Some(payload);

        if buffer.parts.iter().all(Option::is_some) {
            let complete: String = buffer.parts.iter().flatten().cloned().collect();
            self.fragments.remove(&key);
            Some(complete)
        } else {
            None
        }
    }
}

/// Split a framed `!AIVDM`/`!AIVDO` sentence into its six fields after
/// verifying the checksum.
fn checked_fields(line: &str) -> Option<Vec<&str>> {
    let body = line.strip_prefix('!')?;
    let (content, checksum) = body.rsplit_once('*')?;
    if checksum.len() != 2 {
        return None;
    }
    let expected = u8::from_str_radix(checksum, 16).ok()?;
    let computed = content.bytes().fold(0u8, |acc, b| acc ^ b);
    if computed != expected {
        return None;
    }

    let mut fields = content.split(',');
    let talker = fields.next()?;
    if talker != "AIVDM" && talker != "AIVDO" {
        return None;
    }
    let rest: Vec<&str> = fields.collect();
    if rest.len() != 6 {
        return None;
    }
    Some(rest)
}

// ============================================================================
// 6-bit payload
// ============================================================================

struct SixBit {
    groups: Vec<u8>,
}

impl SixBit {
    fn parse(payload: &str) -> Option<Self> {
        let mut groups = Vec::with_capacity(payload.len());
        for c in payload.bytes() {
            let v = match c {
                48..=87 => c - 48,
                96..=119 => c - 56,
                _ => return None,
            };
            groups.push(v);
        }
        Some(Self { groups })
    }

    fn bit_len(&self) -> usize {
        self.groups.len() * 6
    }

    fn uint(&self, start: usize, len: usize) -> Option<u64> {
        if len > 64 || start + len > self.bit_len() {
            return None;
        }
        let mut value = 0u64;
        for i in start..start + len {
            let group = self.groups[i / 6];
            let bit = (group >> (5 - (i % 6))) & 1;
            value = (value << 1) | u64::from(bit);
        }
        Some(value)
    }

    fn int(&self, start: usize, len: usize) -> Option<i64> {
        let raw = self.uint(start, len)?;
        let sign_bit = 1u64 << (len - 1);
        if raw & sign_bit != 0 {
            Some((raw as i64) - (1i64 << len))
        } else {
            Some(raw as i64)
        }
    }

    /// 6-bit ASCII string; '@' is padding, trailing whitespace trimmed.
    fn string(&self, start: usize, len: usize) -> Option<String> {
        let mut out = String::with_capacity(len / 6);
        let mut pos = start;
        while pos + 6 <= start + len && pos + 6 <= self.bit_len() {
            let v = self.uint(pos, 6)? as u8;
            if v == 0 {
                break; // '@' padding
            }
            out.push(if v < 32 { (v + 64) as char } else { v as char });
            pos += 6;
        }
        let trimmed = out.trim_end().to_string();
        Some(trimmed)
    }
}

// ============================================================================
// Field extraction
// ============================================================================

fn decode_payload(payload: &str) -> Option<AisMessage> {
    let bits = SixBit::parse(payload)?;
    let msg_type = bits.uint(0, 6)? as u8;
    let mmsi = bits.uint(8, 30)? as u32;

    match msg_type {
        1..=3 => decode_position(&bits, mmsi, CLASS_A_OFFSETS).map(AisMessage::Position),
        18 => decode_position(&bits, mmsi, CLASS_B_OFFSETS).map(AisMessage::Position),
        19 => decode_extended_class_b(&bits, mmsi).map(AisMessage::Position),
        5 => decode_static_voyage(&bits, mmsi).map(AisMessage::Static),
        24 => decode_static_24(&bits, mmsi).map(AisMessage::Static),
        _ => Some(AisMessage::Other { msg_type, mmsi }),
    }
}

struct PositionOffsets {
    sog: usize,
    lon: usize,
    lat: usize,
    cog: usize,
    heading: usize,
}

const CLASS_A_OFFSETS: PositionOffsets =
    PositionOffsets { sog: 50, lon: 61, lat: 89, cog: 116, heading: 128 };

const CLASS_B_OFFSETS: PositionOffsets =
    PositionOffsets { sog: 46, lon: 57, lat: 85, cog: 112, heading: 124 };

fn decode_position(bits: &SixBit, mmsi: u32, offsets: PositionOffsets) -> Option<VesselUpdate> {
    let sog_raw = bits.uint(offsets.sog, 10)?;
    let lon_raw = bits.int(offsets.lon, 28)?;
    let lat_raw = bits.int(offsets.lat, 27)?;
    let cog_raw = bits.uint(offsets.cog, 12)?;
    let hdg_raw = bits.uint(offsets.heading, 9)?;

    let position = decode_lat_lon(lat_raw, lon_raw);

    Some(VesselUpdate {
        mmsi,
        position,
        speed_knots: (sog_raw != 1023).then(|| f64::from(sog_raw as u32) / 10.0),
        course: (cog_raw != 3600).then(|| f64::from(cog_raw as u32) / 10.0),
        heading: (hdg_raw != 511).then(|| f64::from(hdg_raw as u32)),
        ..VesselUpdate::default()
    })
}

fn decode_lat_lon(lat_raw: i64, lon_raw: i64) -> Option<LatLon> {
    // 181° / 91° are the "not available" sentinels.
    let lon = lon_raw as f64 / 600_000.0;
    let lat = lat_raw as f64 / 600_000.0;
    if lon.abs() > 180.0 || lat.abs() > 90.0 {
        return None;
    }
    Some(LatLon { lat, lon })
}

fn decode_extended_class_b(bits: &SixBit, mmsi: u32) -> Option<VesselUpdate> {
    let mut update = decode_position(bits, mmsi, CLASS_B_OFFSETS)?;
    update.name = bits.string(143, 120).filter(|s| !s.is_empty());
    update.type_code = bits.uint(263, 8).map(|v| v as u8).filter(|v| *v != 0);
    update.dimensions = decode_dimensions(bits, 271);
    Some(update)
}

fn decode_static_voyage(bits: &SixBit, mmsi: u32) -> Option<VesselUpdate> {
    // Type 5 is 424 bits over two fragments.
    if bits.bit_len() < 420 {
        return None;
    }
    Some(VesselUpdate {
        mmsi,
        name: bits.string(112, 120).filter(|s| !s.is_empty()),
        type_code: bits.uint(232, 8).map(|v| v as u8).filter(|v| *v != 0),
        dimensions: decode_dimensions(bits, 240),
        destination: bits.string(302, 120).filter(|s| !s.is_empty()),
        ..VesselUpdate::default()
    })
}

fn decode_static_24(bits: &SixBit, mmsi: u32) -> Option<VesselUpdate> {
    let part = bits.uint(38, 2)?;
    match part {
        0 => Some(VesselUpdate {
            mmsi,
            name: bits.string(40, 120).filter(|s| !s.is_empty()),
            ..VesselUpdate::default()
        }),
        1 => Some(VesselUpdate {
            mmsi,
            type_code: bits.uint(40, 8).map(|v| v as u8).filter(|v| *v != 0),
            dimensions: decode_dimensions(bits, 132),
            ..VesselUpdate::default()
        }),
        _ => None,
    }
}

/// Dimensions from the to-bow/stern/port/starboard quads.
fn decode_dimensions(bits: &SixBit, start: usize) -> Option<Dimensions> {
    let to_bow = bits.uint(start, 9)?;
    let to_stern = bits.uint(start + 9, 9)?;
    let to_port = bits.uint(start + 18, 6)?;
    let to_starboard = bits.uint(start + 24, 6)?;

    let length = (to_bow + to_stern) as u32;
    let width = (to_port + to_starboard) as u32;
    if length == 0 || width == 0 {
        return None;
    }
    Some(Dimensions { length, width })
}
