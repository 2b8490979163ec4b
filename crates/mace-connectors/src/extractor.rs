//! Parses CRYSTAL solver output and auxiliary data files into typed
//! properties and input settings (spec §4.6), plus the outcome classifier
//! that drives the completion callback (spec §4.4).

use mace_core::model::{CalculationStatus, ErrorKind, PropertyValue};
use regex::Regex;
use std::sync::OnceLock;

/// Scans solver output text for the terminal patterns of spec §4.4, in
/// the order given there. The first match wins; no match classifies as
/// `unknown`.
pub fn classify_outcome(solver_output: &str) -> (CalculationStatus, Option<ErrorKind>) {
    if solver_output.contains("ENDED - TOTAL CPU TIME")
        || solver_output.contains("FINAL OPTIMIZED GEOMETRY")
    {
        return (CalculationStatus::Completed, None);
    }
    if solver_output.contains("TOO MANY CYCLES IN SCF") {
        return (CalculationStatus::Failed, Some(ErrorKind::ScfNotConverged));
    }
    if solver_output.contains("INSUFFICIENT MEMORY") || solver_output.contains("ALLOCATION ERROR")
    {
        return (CalculationStatus::Failed, Some(ErrorKind::MemoryExhausted));
    }
    if solver_output.contains("SHRINK FACTORS LESS THAN") {
        return (CalculationStatus::Failed, Some(ErrorKind::ShrinkTooSmall));
    }
    if solver_output.contains("SMALL INTERATOMIC DISTANCE")
        || solver_output.contains("ATOMS TOO CLOSE")
    {
        return (CalculationStatus::Failed, Some(ErrorKind::GeometryCollision));
    }
    if solver_output.contains("TIME LIMIT") {
        return (CalculationStatus::Failed, Some(ErrorKind::WalltimeExceeded));
    }
    (CalculationStatus::Failed, Some(ErrorKind::Unknown))
}

/// Condense a band-path segment list into the `"X G L W G"` / `"X G L|G W
/// G"` form: segments joined by a space when consecutive segments share
/// an endpoint, a `|` inserted at each discontinuity (spec §4.6, testable
/// property 7).
pub fn condense_band_path(segments: &[(String, String)]) -> String {
    let mut out = String::new();
    let mut prev_end: Option<&str> = None;
    for (i, (start, end)) in segments.iter().enumerate() {
        if i == 0 {
            out.push_str(start);
        } else if Some(start.as_str()) == prev_end {
            // continues the previous segment, nothing to re-emit for `start`
        } else {
            out.push('|');
            out.push_str(start);
        }
        out.push(' ');
        out.push_str(end);
        prev_end = Some(end.as_str());
    }
    out
}

/// Inverse of [`condense_band_path`].
pub fn expand_band_path(condensed: &str) -> Vec<(String, String)> {
    let mut segments = Vec::new();
    for group in condensed.split('|') {
        let tokens: Vec<&str> = group.split_whitespace().collect();
        for pair in tokens.windows(2) {
            segments.push((pair[0].to_string(), pair[1].to_string()));
        }
    }
    segments
}

/// Priority-ordered unit assignment (spec §4.6): angles before lengths,
/// volume before length, so `cell_volume` resolves to Å³ rather than Å
/// and `alpha_primitive` resolves to degrees rather than Å.
pub fn assign_unit(property_name: &str) -> Option<&'static str> {
    let name = property_name.to_lowercase();
    if ["alpha", "beta", "gamma", "angle"]
        .iter()
        .any(|tok| name.contains(tok))
    {
        return Some("degrees");
    }
    if name.contains("volume") {
        return Some("Å³");
    }
    if name.contains("mass") {
        return Some("m_e");
    }
    if name.contains("gap") || name.contains("energy") {
        return Some("Ha");
    }
    if name.contains("cell")
        || name.contains("length")
        || name.ends_with("_a")
        || name.ends_with("_b")
        || name.ends_with("_c")
    {
        return Some("Å");
    }
    None
}

fn scalar_pattern(label: &str) -> Regex {
    Regex::new(&format!(r"(?i){label}\s*[:=]?\s*(-?\d+(?:\.\d+)?(?:[eE][-+]?\d+)?)")).unwrap()
}

fn extract_scalar(text: &str, label: &str) -> Option<f64> {
    scalar_pattern(label)
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

static FORMULA_RE: OnceLock<Regex> = OnceLock::new();

/// One extracted scalar property with its name and priority-assigned unit.
pub struct ExtractedProperty {
    pub name: String,
    pub value: PropertyValue,
    pub unit: Option<String>,
    pub category: String,
}

fn scalar_property(name: &str, value: f64, category: &str) -> ExtractedProperty {
    ExtractedProperty {
        name: name.to_string(),
        value: PropertyValue::Scalar(value),
        unit: assign_unit(name).map(str::to_string),
        category: category.to_string(),
    }
}

/// Best-effort scrape of the scalar geometry/electronic properties a
/// completed OPT/SP/BAND/DOSS output conventionally reports. Values that
/// are not found are simply omitted — extraction never fails the
/// calculation (spec §4.6 failure semantics).
pub fn extract_properties(solver_output: &str) -> Vec<ExtractedProperty> {
    let mut props = Vec::new();

    if let Some(v) = extract_scalar(solver_output, "PRIMITIVE CELL VOLUME") {
        props.push(scalar_property("final_primitive_cell_volume", v, "geometry"));
    }
    if let Some(v) = extract_scalar(solver_output, "ALPHA") {
        props.push(scalar_property("final_primitive_alpha", v, "geometry"));
    }
    if let Some(v) = extract_scalar(solver_output, "BETA") {
        props.push(scalar_property("final_primitive_beta", v, "geometry"));
    }
    if let Some(v) = extract_scalar(solver_output, "GAMMA") {
        props.push(scalar_property("final_primitive_gamma", v, "geometry"));
    }
    if let Some(v) = extract_scalar(solver_output, "DIRECT ENERGY GAP") {
        props.push(scalar_property("direct_energy_gap", v, "electronic"));
    }
    if let Some(v) = extract_scalar(solver_output, "EFFECTIVE MASS") {
        props.push(scalar_property("electron_effective_mass_real", v, "electronic"));
    }

    if let Some(formula) = extract_formula(solver_output) {
        props.push(ExtractedProperty {
            name: "formula".to_string(),
            value: PropertyValue::Text(formula),
            unit: None,
            category: "identity".to_string(),
        });
    }

    props
}

fn extract_formula(text: &str) -> Option<String> {
    let re = FORMULA_RE.get_or_init(|| Regex::new(r"(?i)CHEMICAL FORMULA\s*[:=]?\s*([A-Za-z0-9]+)").unwrap());
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Best-effort scrape of a calculation's own effective settings from its
/// solver text, for the `InputSettings` provenance rows (spec §4.6). Fields
/// that aren't found are left `None`/`false` — the store layer's
/// COALESCE-based upsert means a value inherited from a parent calculation
/// is never clobbered by a downstream step's incomplete own parse.
pub struct ExtractedSettings {
    pub method: Option<String>,
    pub basis: Option<String>,
    pub tolerances: Option<String>,
    pub k_points: Option<String>,
    pub functional: Option<String>,
    pub dispersion: bool,
    pub opt_flags: Option<String>,
}

fn text_pattern(label: &str) -> Regex {
    Regex::new(&format!(r"(?i){label}\s*[:=]?\s*([A-Za-z0-9+\-_.]+)")).unwrap()
}

fn extract_text(text: &str, label: &str) -> Option<String> {
    text_pattern(label)
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn extract_input_settings(solver_output: &str) -> ExtractedSettings {
    ExtractedSettings {
        method: extract_text(solver_output, "HAMILTONIAN"),
        basis: extract_text(solver_output, "BASIS SET"),
        tolerances: extract_text(solver_output, "TOLINTEG"),
        k_points: extract_text(solver_output, "SHRINK FACTORS").or_else(|| extract_text(solver_output, "SHRINK")),
        functional: extract_text(solver_output, "DFT FUNCTIONAL").or_else(|| extract_text(solver_output, "FUNCTIONAL")),
        dispersion: solver_output.contains("GRIMME") || solver_output.contains("DFT-D3") || solver_output.contains("DISPERSION"),
        opt_flags: extract_text(solver_output, "OPTGEOM"),
    }
}

/// Best-effort scrape of a material's space-group number and system
/// dimensionality from a solver output, for the `Material` row's
/// provenance fields (spec §3). Absence of either is not an error — a
/// material's metadata is filled in once, whenever a calculation happens
/// to report it (`Store::fill_material_metadata`'s COALESCE semantics).
pub fn extract_space_group(text: &str) -> Option<u32> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?i)SPACE GROUP N\.\s*(\d+)").unwrap());
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

/// Dimensionality from the calculation-type keyword CRYSTAL output always
/// echoes back in its geometry section: `CRYSTAL` (3D), `SLAB` (2D),
/// `POLYMER` (1D), `MOLECULE` (0D) — first match wins.
pub fn extract_dimensionality(text: &str) -> Option<u8> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?i)\b(CRYSTAL|SLAB|POLYMER|MOLECULE)\b").unwrap());
    match re.captures(text)?.get(1)?.as_str().to_uppercase().as_str() {
        "CRYSTAL" => Some(3),
        "SLAB" => Some(2),
        "POLYMER" => Some(1),
        "MOLECULE" => Some(0),
        _ => None,
    }
}

/// Derive the condensed k-path label for a BAND step from its own effective
/// config, when the generator recorded one as `"k_path_segments"`
/// (`[["X","G"], ["G","L"], ...]`) — the actual high-symmetry path is a
/// planner/generator decision, not something this extractor invents.
pub fn band_path_from_config(config: &serde_json::Value) -> Option<String> {
    let segments = config.get("k_path_segments")?.as_array()?;
    let pairs: Vec<(String, String)> = segments
        .iter()
        .filter_map(|seg| {
            let pair = seg.as_array()?;
            let start = pair.first()?.as_str()?.to_string();
            let end = pair.get(1)?.as_str()?.to_string();
            Some((start, end))
        })
        .collect();
    if pairs.is_empty() {
        None
    } else {
        Some(condense_band_path(&pairs))
    }
}

/// Determine whether a metal/semimetal electronic structure was found,
/// using the configurable cutoff resolving spec §9's Open Question
/// rather than a hard-coded physics constant.
pub fn is_metallic(direct_gap_ha: f64, metal_gap_threshold_ha: f64) -> bool {
    direct_gap_ha < metal_gap_threshold_ha
}

/// DOS-at-Fermi criterion: `g(E_F) > ratio * g_mean` (spec §9).
pub fn dos_indicates_metal(g_ef: f64, g_mean: f64, dos_fermi_ratio: f64) -> bool {
    g_mean > 0.0 && g_ef > dos_fermi_ratio * g_mean
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(a: &str, b: &str) -> (String, String) {
        (a.to_string(), b.to_string())
    }

    #[test]
    fn classifies_successful_completion() {
        let (status, kind) = classify_outcome("... ENDED - TOTAL CPU TIME  123.4 ...");
        assert_eq!(status, CalculationStatus::Completed);
        assert!(kind.is_none());
    }

    #[test]
    fn classifies_scf_failure() {
        let (status, kind) = classify_outcome("TOO MANY CYCLES IN SCF");
        assert_eq!(status, CalculationStatus::Failed);
        assert_eq!(kind, Some(ErrorKind::ScfNotConverged));
    }

    #[test]
    fn classifies_unknown_failure() {
        let (status, kind) = classify_outcome("nothing recognizable here");
        assert_eq!(status, CalculationStatus::Failed);
        assert_eq!(kind, Some(ErrorKind::Unknown));
    }

    #[test]
    fn condenses_contiguous_path() {
        let segments = vec![pair("X", "G"), pair("G", "L"), pair("L", "W"), pair("W", "G")];
        assert_eq!(condense_band_path(&segments), "X G L W G");
    }

    #[test]
    fn condenses_path_with_discontinuity() {
        let segments = vec![pair("X", "G"), pair("G", "L"), pair("G", "W"), pair("W", "G")];
        assert_eq!(condense_band_path(&segments), "X G L|G W G");
    }

    #[test]
    fn band_path_round_trips() {
        let segments = vec![pair("X", "G"), pair("G", "L"), pair("G", "W"), pair("W", "G")];
        let condensed = condense_band_path(&segments);
        assert_eq!(expand_band_path(&condensed), segments);
    }

    #[test]
    fn unit_priority_volume_before_length() {
        assert_eq!(assign_unit("final_primitive_cell_volume"), Some("Å³"));
    }

    #[test]
    fn unit_priority_angle_before_length() {
        assert_eq!(assign_unit("final_primitive_alpha"), Some("degrees"));
    }

    #[test]
    fn extracts_functional_and_dispersion_flag() {
        let settings = extract_input_settings("DFT FUNCTIONAL: B3LYP\nGRIMME DISPERSION CORRECTION ACTIVE");
        assert_eq!(settings.functional.as_deref(), Some("B3LYP"));
        assert!(settings.dispersion);
    }

    #[test]
    fn band_path_derives_from_config_segments() {
        let config = serde_json::json!({
            "k_path_segments": [["X", "G"], ["G", "L"], ["G", "W"], ["W", "G"]]
        });
        assert_eq!(band_path_from_config(&config).as_deref(), Some("X G L|G W G"));
    }

    #[test]
    fn band_path_absent_when_config_has_no_segments() {
        assert_eq!(band_path_from_config(&serde_json::json!({})), None);
    }

    #[test]
    fn extracts_space_group_number() {
        assert_eq!(extract_space_group("SPACE GROUP N. 194  :P 63/M M C"), Some(194));
    }

    #[test]
    fn extracts_dimensionality_from_geometry_keyword() {
        assert_eq!(extract_dimensionality("GEOMETRY INPUT CARD\nCRYSTAL\n0 0 0"), Some(3));
        assert_eq!(extract_dimensionality("GEOMETRY INPUT CARD\nSLAB\n0 0 0"), Some(2));
    }
}
