//! Thin CLI harness over the `dep` library. Everything interesting
//! lives in the library; this module only wires arguments to it and
//! prints results.

use clap::{Parser, Subcommand};
use dep::recipe::{JsonRecipeSource, RecipeSource};
use dep::store::{NativeFs, Store, Tier};
use dep::suppliers::{FilesystemSupplier, HttpRegistrySupplier, PackageSupplier};
use dep::version::VersionRange;
use dep::{Config, Error, Result};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dep")]
#[command(author, version, about = "Dependency resolution and build-settings core", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a recipe's dependencies and write the selections file.
    Resolve {
        /// Path to the recipe file (JSON).
        #[arg(default_value = "recipe.json")]
        recipe: PathBuf,

        /// Path to the selections file to read/write.
        #[arg(long, default_value = "selections.toml")]
        selections: PathBuf,

        #[arg(long, default_value = "linux")]
        platform: String,

        /// Re-resolve every dependency, ignoring existing selections.
        #[arg(long)]
        upgrade: bool,

        /// Allow pre-release versions to win resolution.
        #[arg(long)]
        prerelease: bool,

        /// Names allowed to be re-resolved even without `--upgrade`.
        #[arg(long, value_delimiter = ',')]
        select: Vec<String>,
    },

    /// Fetch a single package into the store without resolving a recipe.
    Fetch {
        name: String,

        /// Version range constraint (defaults to any).
        #[arg(long, default_value = "*")]
        range: String,

        #[arg(long, default_value = "project")]
        tier: String,

        #[arg(long)]
        prerelease: bool,
    },

    /// Print the merged build settings for a recipe.
    Describe {
        #[arg(default_value = "recipe.json")]
        recipe: PathBuf,

        #[arg(long)]
        configuration: Option<String>,

        #[arg(long, default_value = "linux")]
        platform: String,

        #[arg(long, default_value = "selections.toml")]
        selections: PathBuf,
    },

    /// Search configured suppliers for packages matching a query.
    Search { query: String },
}

fn parse_tier(s: &str) -> Result<Tier> {
    match s {
        "system" => Ok(Tier::System),
        "user" => Ok(Tier::User),
        "project" => Ok(Tier::Project),
        other => Err(Error::Other(format!("unknown tier '{other}'"))),
    }
}

/// Builds the active supplier list from configuration: an HTTP registry
/// when a token or proxy implies one is configured, plus a filesystem
/// supplier rooted at the user store (mirrors a local mirror directory).
fn build_suppliers(config: &Config) -> Vec<Box<dyn PackageSupplier>> {
    let mut suppliers: Vec<Box<dyn PackageSupplier>> = Vec::new();
    if let Ok(registry_url) = std::env::var("DEP_REGISTRY_URL") {
        suppliers.push(Box::new(HttpRegistrySupplier::new(registry_url, config.auth.token.clone())));
    }
    suppliers.push(Box::new(FilesystemSupplier::new(config.store.user_root.join("mirror"))));
    suppliers
}

pub fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;

    match cli.command {
        Commands::Resolve { recipe, selections, platform, upgrade, prerelease, select } => {
            let text = std::fs::read_to_string(&recipe)?;
            let root = JsonRecipeSource.parse(&text)?;
            let existing = dep::Selections::load(&selections)?;
            let store = Store::native(
                config.store.system_root.clone(),
                config.store.user_root.clone(),
                config.store.project_root.clone(),
            );
            let suppliers = build_suppliers(&config);
            let options = dep::resolver::UpgradeOptions { select, upgrade, prerelease, force_remove_missing: false };
            let (new_selections, graph) =
                dep::resolve(&root, existing.as_ref(), &store, &suppliers, &platform, Tier::Project, options)?;
            new_selections.save(&selections)?;
            println!("resolved {} package(s):", graph.packages.len());
            for name in graph.packages.keys() {
                println!("  {name}");
            }
            Ok(())
        }

        Commands::Fetch { name, range, tier, prerelease } => {
            let range = VersionRange::parse(&range)?;
            let tier = parse_tier(&tier)?;
            let store = Store::native(
                config.store.system_root.clone(),
                config.store.user_root.clone(),
                config.store.project_root.clone(),
            );
            let suppliers = build_suppliers(&config);
            let mut last_err = None;
            for supplier in &suppliers {
                match dep::fetch_native(&store, supplier.as_ref(), &name, &range, prerelease, tier) {
                    Ok(fetched) => {
                        println!("fetched {name} {} into {:?}", fetched.package.version, fetched.package.root);
                        return Ok(());
                    }
                    Err(e) => last_err = Some(e),
                }
            }
            Err(last_err.unwrap_or_else(|| Error::MissingDependency {
                name: name.clone(),
                required_by: "cli".to_string(),
            }))
        }

        Commands::Describe { recipe, configuration, platform, selections } => {
            let text = std::fs::read_to_string(&recipe)?;
            let root = JsonRecipeSource.parse(&text)?;
            let existing = dep::Selections::load(&selections)?.unwrap_or_default();
            let store = Store::native(
                config.store.system_root.clone(),
                config.store.user_root.clone(),
                config.store.project_root.clone(),
            );
            let suppliers = build_suppliers(&config);
            let (_, graph) = dep::resolve(
                &root,
                Some(&existing),
                &store,
                &suppliers,
                &platform,
                Tier::Project,
                dep::resolver::UpgradeOptions::default(),
            )?;
            let merged = dep::merge_build_settings(&root, &graph, configuration.as_deref(), &platform);
            println!("{merged:#?}");
            Ok(())
        }

        Commands::Search { query } => {
            let suppliers = build_suppliers(&config);
            for supplier in &suppliers {
                match supplier.search_packages(&query) {
                    Ok(results) => {
                        for r in results {
                            println!("{} {} - {}", r.name, r.version, r.description.unwrap_or_default());
                        }
                    }
                    Err(e) => tracing::warn!(supplier = %supplier.description(), error = %e, "search failed"),
                }
            }
            Ok(())
        }
    }
}
