//! Script path resolution
//!
//! Turns a path as the user stored it into the absolute path handed to the
//! interpreter. The execution core only ever sees resolved paths.

use std::path::PathBuf;
use tracing::debug;

use crate::config::defaults::USB_PATH_MARKER;
use crate::config::Config;
use crate::error::{Result, ScriptDeckError};

/// Maps a stored script path to an absolute, existing file
pub trait PathResolver {
    fn resolve(&self, raw: &str) -> Result<PathBuf>;
}

/// Resolution rules:
/// - `usb:<rest>` is `<rest>` under the configured USB volume
/// - a leading `~` is the home directory
/// - relative paths are joined onto the scripts folder
#[derive(Debug, Clone, Default)]
pub struct DefaultPathResolver {
    scripts_dir: Option<PathBuf>,
    usb_volume: Option<PathBuf>,
}

impl DefaultPathResolver {
    pub fn new(scripts_dir: Option<PathBuf>, usb_volume: Option<PathBuf>) -> Self {
        Self {
            scripts_dir,
            usb_volume,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(Some(config.get_scripts_dir()), config.get_usb_volume())
    }

    fn usb_path(&self, raw: &str, rest: &str) -> Result<PathBuf> {
        let volume = self
            .usb_volume
            .as_deref()
            .filter(|volume| volume.is_dir())
            .ok_or_else(|| ScriptDeckError::UsbVolumeUnavailable(raw.to_string()))?;
        Ok(volume.join(rest.trim_start_matches('/')))
    }

    fn local_path(&self, raw: &str) -> PathBuf {
        let expanded = PathBuf::from(shellexpand::tilde(raw).as_ref());
        if expanded.is_absolute() {
            return expanded;
        }
        match &self.scripts_dir {
            Some(dir) => dir.join(expanded),
            None => std::path::absolute(&expanded).unwrap_or(expanded),
        }
    }
}

impl PathResolver for DefaultPathResolver {
    fn resolve(&self, raw: &str) -> Result<PathBuf> {
        let raw = raw.trim();
        let path = match raw.strip_prefix(USB_PATH_MARKER) {
            Some(rest) => self.usb_path(raw, rest)?,
            None => self.local_path(raw),
        };

        if !path.is_file() {
            return Err(ScriptDeckError::ScriptNotFound(path));
        }
        debug!(raw = raw, resolved = %path.display(), "Resolved script path");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn touch(dir: &Path, relative: &str) -> PathBuf {
        let path = dir.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, "return 1").unwrap();
        path
    }

    #[test]
    fn test_absolute_path_is_kept() {
        let dir = TempDir::new().unwrap();
        let script = touch(dir.path(), "hello.applescript");
        let resolver = DefaultPathResolver::default();

        assert_eq!(resolver.resolve(script.to_str().unwrap()).unwrap(), script);
    }

    #[test]
    fn test_relative_path_joins_scripts_dir() {
        let dir = TempDir::new().unwrap();
        let script = touch(dir.path(), "sub/report.scpt");
        let resolver = DefaultPathResolver::new(Some(dir.path().to_path_buf()), None);

        assert_eq!(resolver.resolve("sub/report.scpt").unwrap(), script);
    }

    #[test]
    fn test_usb_marker_maps_onto_volume() {
        let volume = TempDir::new().unwrap();
        let script = touch(volume.path(), "Scripts/backup.scpt");
        let resolver = DefaultPathResolver::new(None, Some(volume.path().to_path_buf()));

        assert_eq!(resolver.resolve("usb:/Scripts/backup.scpt").unwrap(), script);
        assert_eq!(resolver.resolve("usb:Scripts/backup.scpt").unwrap(), script);
    }

    #[test]
    fn test_usb_marker_without_volume_fails() {
        let resolver = DefaultPathResolver::default();
        let err = resolver.resolve("usb:/Scripts/backup.scpt").unwrap_err();
        assert!(matches!(err, ScriptDeckError::UsbVolumeUnavailable(_)));
    }

    #[test]
    fn test_usb_marker_with_unmounted_volume_fails() {
        let dir = TempDir::new().unwrap();
        let resolver = DefaultPathResolver::new(None, Some(dir.path().join("not-mounted")));
        let err = resolver.resolve("usb:x.scpt").unwrap_err();
        assert!(matches!(err, ScriptDeckError::UsbVolumeUnavailable(_)));
    }

    #[test]
    fn test_missing_script_is_reported_with_resolved_path() {
        let dir = TempDir::new().unwrap();
        let resolver = DefaultPathResolver::new(Some(dir.path().to_path_buf()), None);

        match resolver.resolve("gone.scpt") {
            Err(ScriptDeckError::ScriptNotFound(path)) => {
                assert_eq!(path, dir.path().join("gone.scpt"))
            }
            other => panic!("expected ScriptNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_directory_is_not_a_script() {
        let dir = TempDir::new().unwrap();
        let resolver = DefaultPathResolver::default();
        assert!(resolver.resolve(dir.path().to_str().unwrap()).is_err());
    }
}
