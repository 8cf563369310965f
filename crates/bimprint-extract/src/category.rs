//! Element categories and their native type names.
//!
//! Presets written for the authoring tool name categories by its built-in
//! identifiers (`OST_Walls`). The geometry kernel only knows IFC entity
//! names, so those identifiers are translated through [`CATEGORY_MAP`].
//! Anything not in the table is taken to be an IFC entity name already.

use tracing::debug;

/// Categories collected when a configuration names none.
pub const DEFAULT_CATEGORIES: &[&str] = &[
    "IfcWall",
    "IfcWallStandardCase",
    "IfcCurtainWall",
    "IfcSlab",
    "IfcRoof",
    "IfcCovering",
    "IfcColumn",
    "IfcBeam",
];

/// Authoring-tool category to IFC entity names.
pub const CATEGORY_MAP: &[(&str, &[&str])] = &[
    ("OST_Walls", &["IfcWall", "IfcWallStandardCase"]),
    ("OST_Roofs", &["IfcRoof"]),
    ("OST_Floors", &["IfcSlab"]),
    ("OST_CurtainWallPanels", &["IfcCurtainWall"]),
    ("OST_CurtainWallMullions", &["IfcCurtainWall"]),
    ("OST_StructuralWall", &["IfcWall", "IfcWallStandardCase"]),
    ("OST_Columns", &["IfcColumn"]),
    ("OST_StructuralColumns", &["IfcColumn"]),
    ("OST_Beams", &["IfcBeam"]),
    ("OST_StructuralFraming", &["IfcBeam"]),
];

/// Native type names for one category.
pub fn native_types(category: &str) -> Vec<&str> {
    CATEGORY_MAP
        .iter()
        .find(|(name, _)| *name == category)
        .map(|(_, types)| types.to_vec())
        .unwrap_or_else(|| vec![category])
}

/// Expand category names to native type names, first occurrence order.
pub fn resolve_types<S: AsRef<str>>(categories: &[S]) -> Vec<String> {
    let mut types: Vec<String> = Vec::new();
    for category in categories {
        for ty in native_types(category.as_ref()) {
            if !types.iter().any(|t| t == ty) {
                types.push(ty.to_string());
            }
        }
    }
    types
}

/// Deduplicate the include list and drop exclude entries that are also
/// included.
///
/// An entry on both lists is kept: inclusion wins.
pub fn normalize_categories(include: &[String], exclude: &[String]) -> (Vec<String>, Vec<String>) {
    let mut inc: Vec<String> = Vec::with_capacity(include.len());
    for name in include {
        if !inc.contains(name) {
            inc.push(name.clone());
        }
    }

    let mut exc: Vec<String> = Vec::with_capacity(exclude.len());
    for name in exclude {
        if !inc.contains(name) && !exc.contains(name) {
            exc.push(name.clone());
        }
    }

    debug!(include = ?inc, exclude = ?exc, "Normalized categories");
    (inc, exc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_mapped_and_passthrough() {
        assert_eq!(native_types("OST_Walls"), vec!["IfcWall", "IfcWallStandardCase"]);
        assert_eq!(native_types("IfcStair"), vec!["IfcStair"]);
    }

    #[test]
    fn test_resolve_dedups_across_categories() {
        let types = resolve_types(&["OST_Walls", "OST_StructuralWall", "IfcSlab", "OST_Floors"]);
        assert_eq!(types, strings(&["IfcWall", "IfcWallStandardCase", "IfcSlab"]));
    }

    #[test]
    fn test_normalize_include_wins() {
        let (inc, exc) = normalize_categories(
            &strings(&["IfcWall", "IfcSlab", "IfcWall"]),
            &strings(&["IfcSlab", "IfcFurnishingElement", "IfcFurnishingElement"]),
        );
        assert_eq!(inc, strings(&["IfcWall", "IfcSlab"]));
        assert_eq!(exc, strings(&["IfcFurnishingElement"]));
    }

    #[test]
    fn test_default_categories_are_native() {
        for name in DEFAULT_CATEGORIES {
            assert_eq!(native_types(name), vec![*name]);
        }
    }
}
