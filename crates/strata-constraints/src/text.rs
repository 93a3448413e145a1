//! Textual constraint format.
//!
//! One block per constraint. Block headers are `G:name:kind`,
//! `R:name:kind`, or `L:cx,cy,cz:lx,ly,lz`; the following indented
//! `Key: value` lines fill in the fields. Lines starting with `#` are
//! comments.

use std::collections::HashMap;

use glam::Vec3;
use strata_common::{ChunkCoord, Direction, FormatError, LocalCoord};
use strata_wfc::State;

use crate::curve::Curve;
use crate::global::{GlobalConstraint, GlobalKind};
use crate::region::{RegionConstraint, RegionKind};

/// A parsed constraint file: the three tiers in declaration order.
#[derive(Debug, Default, Clone)]
pub struct ConstraintSet {
    /// Global constraints.
    pub globals: Vec<GlobalConstraint>,
    /// Region constraints.
    pub regions: Vec<RegionConstraint>,
    /// Local biases as `(chunk, cell, state, bias)`.
    pub locals: Vec<(ChunkCoord, LocalCoord, State, f32)>,
}

/// Parses a constraint file.
///
/// # Errors
///
/// Returns [`FormatError::ConstraintParse`] with the offending line number
/// on malformed input.
pub fn parse(input: &str) -> Result<ConstraintSet, FormatError> {
    let mut set = ConstraintSet::default();
    let mut block: Option<(usize, Block)> = None;

    for (line_index, raw) in input.lines().enumerate() {
        let line_no = line_index + 1;
        let line = raw.trim_end();
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }

        let indented = line.starts_with(' ') || line.starts_with('\t');
        if indented {
            let Some((_, current)) = block.as_mut() else {
                return Err(parse_err(line_no, "field line outside a block"));
            };
            let (key, value) = split_field(line, line_no)?;
            current.set_field(key, value, line_no)?;
        } else {
            if let Some((start, done)) = block.take() {
                done.finish(&mut set, start)?;
            }
            block = Some((line_no, Block::open(line, line_no)?));
        }
    }
    if let Some((start, done)) = block.take() {
        done.finish(&mut set, start)?;
    }
    Ok(set)
}

/// Emits a constraint set in the textual format. `parse` round-trips the
/// output.
#[must_use]
pub fn emit(set: &ConstraintSet) -> String {
    let mut out = String::new();
    for g in &set.globals {
        out.push_str(&format!("G:{}:{}\n", g.name, global_kind_name(g.kind)));
        out.push_str(&format!(
            "  Center: {},{},{}\n",
            g.world_center.x, g.world_center.y, g.world_center.z
        ));
        out.push_str(&format!(
            "  Size: {},{},{}\n",
            g.world_size.x, g.world_size.y, g.world_size.z
        ));
        out.push_str(&format!("  Blend: {}\n", g.blend_radius));
        out.push_str(&format!("  Strength: {}\n", g.strength));
        out.push_str(&format!("  Biases: {}\n", emit_biases(&g.state_biases)));
        if let Some(curve) = &g.blend_curve {
            out.push_str(&format!("  BlendCurve: {}\n", emit_curve(curve)));
        }
        if let Some(curve) = &g.height_curve {
            out.push_str(&format!("  HeightCurve: {}\n", emit_curve(curve)));
        }
        if g.noise_amount > 0.0 {
            out.push_str(&format!("  NoiseAmount: {}\n", g.noise_amount));
            out.push_str(&format!("  NoiseScale: {}\n", g.noise_scale));
        }
    }
    for r in &set.regions {
        out.push_str(&format!("R:{}:{}\n", r.name, region_kind_name(r.kind)));
        out.push_str(&format!(
            "  Chunk: {},{},{}\n",
            r.chunk_coord.x, r.chunk_coord.y, r.chunk_coord.z
        ));
        out.push_str(&format!(
            "  Extent: {},{},{}\n",
            r.chunk_extent.0, r.chunk_extent.1, r.chunk_extent.2
        ));
        out.push_str(&format!(
            "  Origin: {},{},{}\n",
            r.internal_origin.x, r.internal_origin.y, r.internal_origin.z
        ));
        out.push_str(&format!(
            "  InternalSize: {},{},{}\n",
            r.internal_size.x, r.internal_size.y, r.internal_size.z
        ));
        out.push_str(&format!("  Strength: {}\n", r.strength));
        out.push_str(&format!("  Gradient: {}\n", r.gradient));
        if r.kind == RegionKind::Transition {
            out.push_str(&format!("  Source: {}\n", r.source_state));
            out.push_str(&format!("  Target: {}\n", r.target_state));
            out.push_str(&format!(
                "  TransitionDir: {}\n",
                direction_name(r.transition_direction)
            ));
        }
        if !r.state_biases.is_empty() {
            out.push_str(&format!("  Biases: {}\n", emit_biases(&r.state_biases)));
        }
        if r.kind == RegionKind::Elevation {
            out.push_str(&format!("  ElevationOffset: {}\n", r.elevation_offset));
            out.push_str(&format!("  ElevationScale: {}\n", r.elevation_scale));
        }
        if let Some(curve) = &r.height_curve {
            out.push_str(&format!("  HeightCurve: {}\n", emit_curve(curve)));
        }
    }
    for (chunk, local, state, bias) in &set.locals {
        out.push_str(&format!(
            "L:{},{},{}:{},{},{}\n",
            chunk.x, chunk.y, chunk.z, local.x, local.y, local.z
        ));
        out.push_str(&format!("  Biases: {state}={bias}\n"));
    }
    out
}

enum Block {
    Global(GlobalConstraint),
    Region(RegionConstraint),
    Local {
        chunk: ChunkCoord,
        local: LocalCoord,
        biases: HashMap<State, f32>,
    },
}

impl Block {
    fn open(line: &str, line_no: usize) -> Result<Self, FormatError> {
        let mut parts = line.splitn(3, ':');
        let tag = parts.next().unwrap_or_default();
        match tag {
            "G" => {
                let name = parts
                    .next()
                    .ok_or_else(|| parse_err(line_no, "missing global name"))?;
                let kind = match parts.next() {
                    Some("BiomeRegion") => GlobalKind::BiomeRegion,
                    Some("HeightMap") => GlobalKind::HeightMap,
                    other => {
                        return Err(parse_err(
                            line_no,
                            format!("unknown global kind {other:?}"),
                        ))
                    }
                };
                Ok(Self::Global(GlobalConstraint::new(
                    name,
                    kind,
                    Vec3::ZERO,
                    Vec3::ZERO,
                    0.0,
                    1.0,
                    HashMap::new(),
                )))
            }
            "R" => {
                let name = parts
                    .next()
                    .ok_or_else(|| parse_err(line_no, "missing region name"))?;
                let kind = match parts.next() {
                    Some("Transition") => RegionKind::Transition,
                    Some("Feature") => RegionKind::Feature,
                    Some("Elevation") => RegionKind::Elevation,
                    other => {
                        return Err(parse_err(
                            line_no,
                            format!("unknown region kind {other:?}"),
                        ))
                    }
                };
                let mut region = RegionConstraint::feature(
                    name,
                    ChunkCoord::new(0, 0, 0),
                    Vec3::ZERO,
                    Vec3::ONE,
                    1.0,
                    HashMap::new(),
                );
                region.kind = kind;
                Ok(Self::Region(region))
            }
            "L" => {
                let chunk = parse_i32_triple(
                    parts
                        .next()
                        .ok_or_else(|| parse_err(line_no, "missing local chunk coord"))?,
                    line_no,
                )?;
                let local = parse_u16_triple(
                    parts
                        .next()
                        .ok_or_else(|| parse_err(line_no, "missing local cell coord"))?,
                    line_no,
                )?;
                Ok(Self::Local {
                    chunk: ChunkCoord::new(chunk.0, chunk.1, chunk.2),
                    local: LocalCoord::new(local.0, local.1, local.2),
                    biases: HashMap::new(),
                })
            }
            other => Err(parse_err(line_no, format!("unknown block tag {other:?}"))),
        }
    }

    fn set_field(&mut self, key: &str, value: &str, line_no: usize) -> Result<(), FormatError> {
        match self {
            Self::Global(g) => match key {
                "Center" => g.world_center = parse_vec3(value, line_no)?,
                "Size" => g.world_size = parse_vec3(value, line_no)?,
                "Blend" => g.blend_radius = parse_f32(value, line_no)?,
                "Strength" => g.strength = parse_f32(value, line_no)?,
                "Biases" => g.state_biases = parse_biases(value, line_no)?,
                "BlendCurve" => g.blend_curve = Some(parse_curve(value, line_no)?),
                "HeightCurve" => g.height_curve = Some(parse_curve(value, line_no)?),
                "NoiseAmount" => g.noise_amount = parse_f32(value, line_no)?,
                "NoiseScale" => g.noise_scale = parse_f32(value, line_no)?,
                _ => return Err(parse_err(line_no, format!("unknown global key {key:?}"))),
            },
            Self::Region(r) => match key {
                "Chunk" => {
                    let (x, y, z) = parse_i32_triple(value, line_no)?;
                    r.chunk_coord = ChunkCoord::new(x, y, z);
                }
                "Extent" => {
                    let (x, y, z) = parse_u32_triple(value, line_no)?;
                    r.chunk_extent = (x, y, z);
                }
                "Origin" => r.internal_origin = parse_vec3(value, line_no)?,
                "InternalSize" => r.internal_size = parse_vec3(value, line_no)?,
                "Strength" => r.strength = parse_f32(value, line_no)?,
                "Gradient" => r.gradient = parse_f32(value, line_no)?,
                "Source" => r.source_state = parse_state(value, line_no)?,
                "Target" => r.target_state = parse_state(value, line_no)?,
                "TransitionDir" => r.transition_direction = parse_direction(value, line_no)?,
                "Biases" => r.state_biases = parse_biases(value, line_no)?,
                "ElevationOffset" => r.elevation_offset = parse_f32(value, line_no)?,
                "ElevationScale" => r.elevation_scale = parse_f32(value, line_no)?,
                "HeightCurve" => r.height_curve = Some(parse_curve(value, line_no)?),
                _ => return Err(parse_err(line_no, format!("unknown region key {key:?}"))),
            },
            Self::Local { biases, .. } => match key {
                "Biases" => *biases = parse_biases(value, line_no)?,
                _ => return Err(parse_err(line_no, format!("unknown local key {key:?}"))),
            },
        }
        Ok(())
    }

    fn finish(self, set: &mut ConstraintSet, _start_line: usize) -> Result<(), FormatError> {
        match self {
            Self::Global(g) => set.globals.push(g),
            Self::Region(r) => set.regions.push(r),
            Self::Local {
                chunk,
                local,
                biases,
            } => {
                for (state, bias) in biases {
                    set.locals.push((chunk, local, state, bias));
                }
            }
        }
        Ok(())
    }
}

fn parse_err(line: usize, message: impl Into<String>) -> FormatError {
    FormatError::ConstraintParse {
        line,
        message: message.into(),
    }
}

fn split_field(line: &str, line_no: usize) -> Result<(&str, &str), FormatError> {
    let trimmed = line.trim_start();
    let (key, value) = trimmed
        .split_once(':')
        .ok_or_else(|| parse_err(line_no, "expected `Key: value`"))?;
    Ok((key.trim(), value.trim()))
}

fn parse_f32(value: &str, line_no: usize) -> Result<f32, FormatError> {
    value
        .parse()
        .map_err(|_| parse_err(line_no, format!("bad number {value:?}")))
}

fn parse_state(value: &str, line_no: usize) -> Result<State, FormatError> {
    value
        .parse()
        .map_err(|_| parse_err(line_no, format!("bad state {value:?}")))
}

fn parse_vec3(value: &str, line_no: usize) -> Result<Vec3, FormatError> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        return Err(parse_err(line_no, format!("expected x,y,z, got {value:?}")));
    }
    Ok(Vec3::new(
        parse_f32(parts[0], line_no)?,
        parse_f32(parts[1], line_no)?,
        parse_f32(parts[2], line_no)?,
    ))
}

fn parse_i32_triple(value: &str, line_no: usize) -> Result<(i32, i32, i32), FormatError> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        return Err(parse_err(line_no, format!("expected x,y,z, got {value:?}")));
    }
    let parse = |s: &str| {
        s.parse::<i32>()
            .map_err(|_| parse_err(line_no, format!("bad integer {s:?}")))
    };
    Ok((parse(parts[0])?, parse(parts[1])?, parse(parts[2])?))
}

fn parse_u32_triple(value: &str, line_no: usize) -> Result<(u32, u32, u32), FormatError> {
    let (x, y, z) = parse_i32_triple(value, line_no)?;
    if x < 0 || y < 0 || z < 0 {
        return Err(parse_err(line_no, format!("expected non-negative extent, got {value:?}")));
    }
    Ok((x as u32, y as u32, z as u32))
}

fn parse_u16_triple(value: &str, line_no: usize) -> Result<(u16, u16, u16), FormatError> {
    let (x, y, z) = parse_i32_triple(value, line_no)?;
    if !(0..=i32::from(u16::MAX)).contains(&x)
        || !(0..=i32::from(u16::MAX)).contains(&y)
        || !(0..=i32::from(u16::MAX)).contains(&z)
    {
        return Err(parse_err(line_no, format!("cell coord out of range {value:?}")));
    }
    Ok((x as u16, y as u16, z as u16))
}

fn parse_biases(value: &str, line_no: usize) -> Result<HashMap<State, f32>, FormatError> {
    let mut biases = HashMap::new();
    for entry in value.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (state, bias) = entry
            .split_once('=')
            .ok_or_else(|| parse_err(line_no, format!("expected state=bias, got {entry:?}")))?;
        biases.insert(
            parse_state(state.trim(), line_no)?,
            parse_f32(bias.trim(), line_no)?,
        );
    }
    Ok(biases)
}

fn parse_direction(value: &str, line_no: usize) -> Result<Direction, FormatError> {
    match value {
        "-X" => Ok(Direction::NegX),
        "+X" => Ok(Direction::PosX),
        "-Y" => Ok(Direction::NegY),
        "+Y" => Ok(Direction::PosY),
        "-Z" => Ok(Direction::NegZ),
        "+Z" => Ok(Direction::PosZ),
        _ => Err(parse_err(line_no, format!("bad direction {value:?}"))),
    }
}

fn parse_curve(value: &str, line_no: usize) -> Result<Curve, FormatError> {
    match value {
        "linear" => Ok(Curve::Linear),
        "smoothstep" => Ok(Curve::SmoothStep),
        other => {
            let Some(points) = other.strip_prefix("points:") else {
                return Err(parse_err(line_no, format!("bad curve {value:?}")));
            };
            let mut parsed = Vec::new();
            for pair in points.split(',') {
                let (t, v) = pair
                    .trim()
                    .split_once('=')
                    .ok_or_else(|| parse_err(line_no, format!("expected t=v, got {pair:?}")))?;
                parsed.push((parse_f32(t, line_no)?, parse_f32(v, line_no)?));
            }
            Ok(Curve::Points(parsed))
        }
    }
}

fn direction_name(dir: Direction) -> &'static str {
    match dir {
        Direction::NegX => "-X",
        Direction::PosX => "+X",
        Direction::NegY => "-Y",
        Direction::PosY => "+Y",
        Direction::NegZ => "-Z",
        Direction::PosZ => "+Z",
    }
}

fn global_kind_name(kind: GlobalKind) -> &'static str {
    match kind {
        GlobalKind::BiomeRegion => "BiomeRegion",
        GlobalKind::HeightMap => "HeightMap",
    }
}

fn region_kind_name(kind: RegionKind) -> &'static str {
    match kind {
        RegionKind::Transition => "Transition",
        RegionKind::Feature => "Feature",
        RegionKind::Elevation => "Elevation",
    }
}

fn emit_biases(biases: &HashMap<State, f32>) -> String {
    let mut entries: Vec<(State, f32)> = biases.iter().map(|(&s, &b)| (s, b)).collect();
    entries.sort_by_key(|(s, _)| *s);
    entries
        .iter()
        .map(|(s, b)| format!("{s}={b}"))
        .collect::<Vec<_>>()
        .join(",")
}

fn emit_curve(curve: &Curve) -> String {
    match curve {
        Curve::Linear => "linear".to_string(),
        Curve::SmoothStep => "smoothstep".to_string(),
        Curve::Points(points) => {
            let body = points
                .iter()
                .map(|(t, v)| format!("{t}={v}"))
                .collect::<Vec<_>>()
                .join(",");
            format!("points:{body}")
        }
    }
}
