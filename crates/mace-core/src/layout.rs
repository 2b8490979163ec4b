//! Filesystem layout shared by the workflow engine and the submit service
//! (spec §6): both derive a step's working directory the same way, so the
//! rule lives in one place rather than being duplicated per crate.

use std::path::{Path, PathBuf};

/// `<base>/workflow_outputs/<workflow_id>/step_<NNN>_<TYPE>/<material_id>/`
pub fn step_dir(base: &Path, workflow_id: &str, step_index: u32, calc_label: &str, material_id: &str) -> PathBuf {
    base.join("workflow_outputs")
        .join(workflow_id)
        .join(format!("step_{step_index:03}_{calc_label}"))
        .join(material_id)
}

/// `<base>/workflow_scripts/` — per-step submission script templates.
pub fn scripts_dir(base: &Path) -> PathBuf {
    base.join("workflow_scripts")
}

/// `<base>/workflow_configs/` — plan and generator configs.
pub fn configs_dir(base: &Path) -> PathBuf {
    base.join("workflow_configs")
}

/// `<base>/workflow_inputs/` — starting inputs (first-step).
pub fn inputs_dir(base: &Path) -> PathBuf {
    base.join("workflow_inputs")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_dir_matches_layout() {
        let p = step_dir(Path::new("/base"), "wf-1", 2, "SP", "diamond");
        assert_eq!(p, PathBuf::from("/base/workflow_outputs/wf-1/step_002_SP/diamond"));
    }
}
