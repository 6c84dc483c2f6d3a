//! Resolves collisions between inline and path-based sub-package
//! declarations. Path-based entries are keyed by their own declared
//! recipe name — loaded relative to `base_dir` — the same as inline
//! entries, so "inline wins" compares like with like.

use super::{JsonRecipeSource, Recipe, RecipeSource, SubPackageRef};
use crate::error::{Error, Result};
use crate::value_types::RelativePath;
use std::collections::BTreeMap;
use std::path::Path;

const RECIPE_FILE_NAME: &str = "recipe.json";

/// An inline sub-package recipe wins over a path-based one declared
/// under the same name. A collision between two inline recipes, or two
/// path-based ones, under the same name is an error — ambiguous and not
/// silently resolved by declaration order.
///
/// Decision recorded in DESIGN.md: "inline wins, error on ambiguity".
pub fn resolve_sub_packages(
    refs: &[SubPackageRef],
    base_dir: Option<&Path>,
) -> Result<BTreeMap<String, Recipe>> {
    let mut inline: BTreeMap<String, Recipe> = BTreeMap::new();
    let mut path_based: BTreeMap<String, Recipe> = BTreeMap::new();

    for r in refs {
        match r {
            SubPackageRef::Inline(recipe) => {
                let name = recipe.name.full().to_string();
                if inline.insert(name.clone(), (**recipe).clone()).is_some() {
                    return Err(Error::InvalidRecipe(format!(
                        "duplicate inline sub-package recipe for '{name}'"
                    )));
                }
            }
            SubPackageRef::Path(path) => {
                let recipe = load_path_recipe(base_dir, path)?;
                let name = recipe.name.full().to_string();
                if path_based.insert(name.clone(), recipe).is_some() {
                    return Err(Error::InvalidRecipe(format!(
                        "duplicate path-based sub-package declaration for '{name}'"
                    )));
                }
            }
        }
    }

    let mut merged = path_based;
    for (name, recipe) in inline {
        merged.insert(name, recipe);
    }
    Ok(merged)
}

fn load_path_recipe(base_dir: Option<&Path>, path: &RelativePath) -> Result<Recipe> {
    let base_dir = base_dir.ok_or_else(|| {
        Error::InvalidRecipe(format!(
            "path-based sub-package at '{}' needs its containing package materialized first",
            path.as_path().display()
        ))
    })?;
    let recipe_path = path.resolve(base_dir).join(RECIPE_FILE_NAME);
    let text = std::fs::read_to_string(&recipe_path).map_err(|_| {
        Error::InvalidRecipe(format!(
            "sub-package recipe not found at {}",
            recipe_path.display()
        ))
    })?;
    JsonRecipeSource.parse(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::{BuildSettings, PackageName, Recipe};

    fn recipe_named(name: &str) -> Recipe {
        Recipe {
            name: PackageName::parse(name).unwrap(),
            version: None,
            description: None,
            dependencies: Vec::new(),
            configurations: Vec::new(),
            build_settings: BuildSettings::default(),
            sub_packages: Vec::new(),
        }
    }

    fn write_recipe(base: &Path, sub_dir: &str, name: &str) {
        let dir = base.join(sub_dir);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(RECIPE_FILE_NAME), format!(r#"{{"name":"{name}"}}"#)).unwrap();
    }

    #[test]
    fn inline_wins_over_path_based_declaring_the_same_name() {
        let tmp = tempfile::tempdir().unwrap();
        write_recipe(tmp.path(), "sub-dir", "sub");

        let refs = vec![
            SubPackageRef::Path(RelativePath::new("sub-dir").unwrap()),
            SubPackageRef::Inline(Box::new(recipe_named("sub"))),
        ];
        let resolved = resolve_sub_packages(&refs, Some(tmp.path())).unwrap();
        assert_eq!(resolved.len(), 1);
        assert!(resolved.contains_key("sub"));
    }

    #[test]
    fn path_based_key_follows_the_recipe_s_declared_name_not_its_directory() {
        let tmp = tempfile::tempdir().unwrap();
        write_recipe(tmp.path(), "weirdly-named-dir", "real-name");

        let refs = vec![SubPackageRef::Path(
            RelativePath::new("weirdly-named-dir").unwrap(),
        )];
        let resolved = resolve_sub_packages(&refs, Some(tmp.path())).unwrap();
        assert!(resolved.contains_key("real-name"));
        assert!(!resolved.contains_key("weirdly-named-dir"));
    }

    #[test]
    fn duplicate_inline_names_is_an_error() {
        let refs = vec![
            SubPackageRef::Inline(Box::new(recipe_named("dup"))),
            SubPackageRef::Inline(Box::new(recipe_named("dup"))),
        ];
        assert!(resolve_sub_packages(&refs, None).is_err());
    }

    #[test]
    fn duplicate_path_declarations_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        write_recipe(tmp.path(), "a", "dup");
        write_recipe(tmp.path(), "b", "dup");
        let refs = vec![
            SubPackageRef::Path(RelativePath::new("a").unwrap()),
            SubPackageRef::Path(RelativePath::new("b").unwrap()),
        ];
        assert!(resolve_sub_packages(&refs, Some(tmp.path())).is_err());
    }

    #[test]
    fn path_based_without_a_base_dir_is_an_error() {
        let refs = vec![SubPackageRef::Path(RelativePath::new("sub-dir").unwrap())];
        assert!(resolve_sub_packages(&refs, None).is_err());
    }
}
