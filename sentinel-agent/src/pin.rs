//! Counter map pins on bpffs
//!
//! Only the path half lives here. Callers decide, from the kernel's view of the pinned
//! map, whether a leftover pin is still in use and whether a pin is theirs to remove.

use anyhow::{bail, Context, Result};
use log::{debug, warn};
use std::fs;
use std::path::Path;

/// Make `path` ready for a new pin.
///
/// Creates the parent directory. A leftover pin is removed unless `in_use` reports that
/// its map is still held by a live program, in which case this fails and the pin is left
/// alone.
pub fn prepare<F>(path: &Path, in_use: F) -> Result<()>
where
    F: FnOnce(&Path) -> Result<bool>,
{
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    if !exists(path)? {
        return Ok(());
    }

    if in_use(path)? {
        bail!(
            "{} is pinned by a live program; stop its owner or choose another pin path",
            path.display()
        );
    }

    fs::remove_file(path).with_context(|| format!("failed to remove {}", path.display()))?;
    warn!("Removed stale counter pin at {}", path.display());
    Ok(())
}

/// Remove the pin at `path` when `owned` confirms it still refers to our map.
///
/// Returns whether the pin was removed. A pin that is gone or now belongs to another
/// map is left as is.
pub fn release<F>(path: &Path, owned: F) -> Result<bool>
where
    F: FnOnce(&Path) -> Result<bool>,
{
    if !exists(path)? {
        debug!("Counter pin {} already gone", path.display());
        return Ok(false);
    }

    if !owned(path)? {
        warn!(
            "Counter pin {} now refers to another map, leaving it in place",
            path.display()
        );
        return Ok(false);
    }

    fs::remove_file(path).with_context(|| format!("failed to remove {}", path.display()))?;
    debug!("Removed counter pin {}", path.display());
    Ok(true)
}

fn exists(path: &Path) -> Result<bool> {
    path.try_exists()
        .with_context(|| format!("failed to stat {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::cell::Cell;
    use tempfile::TempDir;

    #[test]
    fn test_prepare_creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sentinel").join("packet_cnt");

        prepare(&path, |_| panic!("nothing pinned yet")).unwrap();

        assert!(path.parent().unwrap().is_dir());
        assert!(!path.exists());
    }

    #[test]
    fn test_prepare_replaces_stale_pin() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("packet_cnt");
        fs::write(&path, b"old map").unwrap();

        prepare(&path, |_| Ok(false)).unwrap();

        assert!(!path.exists());
    }

    #[test]
    fn test_prepare_keeps_pin_held_by_live_program() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("packet_cnt");
        fs::write(&path, b"live map").unwrap();

        let err = prepare(&path, |_| Ok(true)).unwrap_err();

        assert!(err.to_string().contains("live program"));
        assert_eq!(fs::read(&path).unwrap(), b"live map");
    }

    #[test]
    fn test_prepare_keeps_pin_when_liveness_unknown() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("packet_cnt");
        fs::write(&path, b"map").unwrap();

        assert!(prepare(&path, |_| Err(anyhow!("no map ids"))).is_err());
        assert!(path.exists());
    }

    #[test]
    fn test_release_removes_own_pin() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("packet_cnt");
        fs::write(&path, b"our map").unwrap();

        assert!(release(&path, |_| Ok(true)).unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn test_release_leaves_pin_taken_over_by_another_map() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("packet_cnt");
        fs::write(&path, b"second agent's map").unwrap();

        assert!(!release(&path, |_| Ok(false)).unwrap());
        assert_eq!(fs::read(&path).unwrap(), b"second agent's map");
    }

    #[test]
    fn test_release_missing_pin_skips_ownership_check() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("packet_cnt");
        let checked = Cell::new(false);

        let removed = release(&path, |_| {
            checked.set(true);
            Ok(true)
        })
        .unwrap();

        assert!(!removed);
        assert!(!checked.get());
    }

    #[test]
    fn test_second_pin_survives_first_owner_shutdown() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("packet_cnt");

        // First owner pins map 7.
        prepare(&path, |_| Ok(false)).unwrap();
        fs::write(&path, b"7").unwrap();

        // Its map is no longer live; a second owner replaces the pin with map 9.
        prepare(&path, |_| Ok(false)).unwrap();
        fs::write(&path, b"9").unwrap();

        let pinned_id = |p: &Path| -> Result<u32> { Ok(fs::read_to_string(p)?.parse()?) };

        // The first owner shuts down and must not remove map 9's pin.
        assert!(!release(&path, |p| Ok(pinned_id(p)? == 7)).unwrap());
        assert!(path.exists());

        assert!(release(&path, |p| Ok(pinned_id(p)? == 9)).unwrap());
        assert!(!path.exists());
    }
}
