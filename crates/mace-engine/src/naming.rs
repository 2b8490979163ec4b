//! Deterministic material-identifier extraction (spec §4.1, invariant 3,
//! testable property 4). A single function is the only legitimate place
//! in the codebase that turns a filename into a material id — no other
//! module is allowed to derive one independently.

use regex::Regex;
use std::sync::OnceLock;

fn suffix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)_(opt|sp|freq|band|doss|transport)\d*$").unwrap()
    })
}

fn anchor_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)_(BULK|CRYSTAL|symm|B3LYP-D3)").unwrap())
}

fn strip_extension(filename: &str) -> &str {
    let base = filename.rsplit('/').next().unwrap_or(filename);
    match base.rfind('.') {
        Some(i) if i > 0 => &base[..i],
        _ => base,
    }
}

/// Step 1: strip a single trailing calculation-suffix token (`_opt`,
/// `_sp2`, `_freq`, …) in one pass — not iteratively, so a filename with
/// two suffix-shaped tokens only loses the last one.
fn strip_calc_suffix(stem: &str) -> &str {
    match suffix_re().find(stem) {
        Some(m) => &stem[..m.start()],
        None => stem,
    }
}

/// Step 2: cut at the first technical-decoration anchor token, dropping
/// everything from that point on.
fn collapse_decoration(stem: &str) -> &str {
    match anchor_re().find(stem) {
        Some(m) => &stem[..m.start()],
        None => stem,
    }
}

/// Step 3: non-alphanumerics become underscores; a `mat_` prefix is added
/// when the result would otherwise begin with a digit.
fn sanitize(stem: &str) -> String {
    let cleaned: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if cleaned.starts_with(|c: char| c.is_ascii_digit()) {
        format!("mat_{cleaned}")
    } else {
        cleaned
    }
}

/// Maps any input or output filename (D12, D3, solver output) to its
/// owning material's stable identifier.
pub fn material_id(filename: &str) -> String {
    let stem = strip_extension(filename);
    let stem = strip_calc_suffix(stem);
    let stem = collapse_decoration(stem);
    sanitize(stem)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_extension_and_calc_suffix() {
        assert_eq!(material_id("diamond_opt.d12"), "diamond");
        assert_eq!(material_id("diamond_sp2.out"), "diamond");
    }

    #[test]
    fn collapses_technical_decoration() {
        assert_eq!(material_id("quartz_BULK_symm_opt.d12"), "quartz");
        assert_eq!(material_id("nacl_B3LYP-D3_sp.out"), "nacl");
    }

    #[test]
    fn sanitizes_non_alphanumerics() {
        assert_eq!(material_id("mg-o.cif"), "mg_o");
    }

    #[test]
    fn prefixes_digit_leading_names() {
        assert_eq!(material_id("2d-mos2_opt.d12"), "mat_2d_mos2");
    }

    #[test]
    fn is_idempotent() {
        for name in ["diamond_opt.d12", "quartz_BULK_symm_opt.d12", "2d-mos2_opt.d12"] {
            let once = material_id(name);
            let twice = material_id(&once);
            assert_eq!(once, twice, "material_id should be a fixed point on its own output");
        }
    }
}
