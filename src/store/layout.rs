//! The deterministic on-disk layout for a stored package
//! `<tier>/packages/<main>/<version>/<main>/`.

use std::path::{Path, PathBuf};

pub fn package_dir(tier_root: &Path, main_name: &str, version: &str) -> PathBuf {
    tier_root
        .join("packages")
        .join(main_name)
        .join(version)
        .join(main_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_deterministic() {
        let a = package_dir(Path::new("/root"), "foo", "1.0.0");
        let b = package_dir(Path::new("/root"), "foo", "1.0.0");
        assert_eq!(a, b);
        assert_eq!(a, PathBuf::from("/root/packages/foo/1.0.0/foo"));
    }
}
