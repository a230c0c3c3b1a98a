//! Parsers for the string-valued properties of the map format. Each returns
//! a short reason on failure; the loader attaches path and property name.

use crate::grid::{Exit, TileFlags, VICoord};

pub(crate) type ParseResult<T> = Result<T, &'static str>;

/// Comma-separated flag names, e.g. `"nowalk,nowalk_npc"`.
pub(crate) fn parse_flags(raw: &str) -> ParseResult<TileFlags> {
    let mut flags = TileFlags::empty();
    for name in raw.split(',').map(str::trim).filter(|name| !name.is_empty()) {
        flags |= match name {
            "nowalk" => TileFlags::NOWALK,
            "nowalk_player" => TileFlags::NOWALK_PLAYER,
            "nowalk_npc" => TileFlags::NOWALK_NPC,
            _ => return Err("unknown tile flag"),
        };
    }
    Ok(flags)
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ParsedExit {
    pub exit: Exit,
    /// The x coordinate advances with each covered column.
    pub wide_x: bool,
    /// The y coordinate advances with each covered row.
    pub wide_y: bool,
}

impl ParsedExit {
    /// The exit as seen from a tile `(dx, dy)` into the object rectangle.
    pub fn at_offset(&self, dx: i32, dy: i32) -> Exit {
        let mut exit = self.exit.clone();
        if self.wide_x {
            exit.coords.x += dx;
        }
        if self.wide_y {
            exit.coords.y += dy;
        }
        exit
    }
}

/// `"area,x,y,z"`. A trailing `+` on x or y makes the exit wide.
pub(crate) fn parse_exit(raw: &str) -> ParseResult<ParsedExit> {
    let parts: Vec<&str> = raw.split(',').collect();
    let [area, x, y, z] = parts.as_slice() else {
        return Err("exit must be \"area,x,y,z\"");
    };
    let area = area.trim();
    if area.is_empty() {
        return Err("exit names no area");
    }
    let (x, wide_x) = exit_coordinate(x)?;
    let (y, wide_y) = exit_coordinate(y)?;
    let depth = parse_depth(z)?;
    Ok(ParsedExit {
        exit: Exit {
            area: area.to_owned(),
            coords: VICoord::new(x, y, depth),
        },
        wide_x,
        wide_y,
    })
}

fn exit_coordinate(raw: &str) -> ParseResult<(i32, bool)> {
    let raw = raw.trim();
    let (digits, wide) = match raw.strip_suffix('+') {
        Some(digits) => (digits, true),
        None => (raw, false),
    };
    if digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err("exit coordinate must be a non-negative integer");
    }
    let value = digits
        .parse::<i32>()
        .map_err(|_| "exit coordinate is too large")?;
    Ok((value, wide))
}

pub(crate) fn parse_depth(raw: &str) -> ParseResult<f32> {
    match raw.trim().parse::<f32>() {
        Ok(depth) if depth.is_finite() => Ok(depth),
        _ => Err("depth must be a finite number"),
    }
}

/// `"a,r,g,b"` with every channel in `0..=255`, packed as `0xAARRGGBB`.
pub(crate) fn parse_argb(raw: &str) -> ParseResult<u32> {
    let parts: Vec<&str> = raw.split(',').collect();
    if parts.len() != 4 {
        return Err("colour must be \"a,r,g,b\"");
    }
    let mut packed = 0u32;
    for part in parts {
        let channel = part
            .trim()
            .parse::<i64>()
            .map_err(|_| "colour channel must be an integer")?;
        let channel = u8::try_from(channel).map_err(|_| "colour channel must be 0..=255")?;
        packed = (packed << 8) | u32::from(channel);
    }
    Ok(packed)
}

/// Which axes wrap, from a string such as `"x"`, `"y"` or `"xy"`.
pub(crate) fn parse_loop(raw: &str) -> (bool, bool) {
    (raw.contains('x'), raw.contains('y'))
}

/// Animation speed in Hz to frame length in milliseconds.
pub(crate) fn parse_speed(raw: &str) -> ParseResult<u64> {
    match raw.trim().parse::<f64>() {
        Ok(hertz) if hertz.is_finite() && hertz > 0.0 => Ok((1000.0 / hertz) as u64),
        _ => Err("speed must be a positive number"),
    }
}
