//! Small shared helpers: path expansion, geometry parsing, size formatting.

use std::path::PathBuf;

/// Expands a leading `~/` to the user's home directory.
///
/// Paths without a tilde prefix (including bare `~user` forms) pass through
/// unchanged.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(stripped);
    }
    PathBuf::from(path)
}

/// Parses a slurp-style geometry string `"X,Y WxH"` into (x, y, width, height).
///
/// This is the format emitted by `slurp` and accepted by `grim -g`, so region
/// selections can be piped straight in:
/// `snapvault capture --region "$(slurp)"`.
pub fn parse_geometry(spec: &str) -> Result<(i32, i32, u32, u32), String> {
    let (position, size) = spec
        .trim()
        .split_once(' ')
        .ok_or_else(|| format!("invalid geometry '{spec}' (expected \"X,Y WxH\")"))?;

    let (x, y) = position
        .split_once(',')
        .ok_or_else(|| format!("invalid geometry position '{position}' (expected \"X,Y\")"))?;
    let (w, h) = size
        .split_once('x')
        .ok_or_else(|| format!("invalid geometry size '{size}' (expected \"WxH\")"))?;

    let x = x
        .trim()
        .parse::<i32>()
        .map_err(|_| format!("invalid x coordinate '{x}'"))?;
    let y = y
        .trim()
        .parse::<i32>()
        .map_err(|_| format!("invalid y coordinate '{y}'"))?;
    let w = w
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid width '{w}'"))?;
    let h = h
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid height '{h}'"))?;

    Ok((x, y, w, h))
}

/// Formats a byte count for display (B, KiB, MiB).
pub fn human_size(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;

    if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}
