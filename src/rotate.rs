//! Size-based log file rotation.

use std::path::{Path, PathBuf};

use crate::error::RotateError;

/// Tracks bytes written to the active file and renames it aside once a
/// threshold is crossed.
///
/// Rotation renames `<base><ext>` to `<base><k><ext>` for the smallest
/// `k >= 1` not already on disk; the sink then reopens the original name
/// as a fresh empty file. Rotated files are never touched again.
#[derive(Debug)]
pub struct FileRotater {
    directory: PathBuf,
    base_name: String,
    extension: String,
    current_path: PathBuf,
    max_bytes: u64,
    current_bytes: u64,
}

impl FileRotater {
    /// New rotater for `path` with a `max_bytes` threshold.
    ///
    /// Byte accounting starts at zero even when the file already exists:
    /// rotation measures what this process wrote, not the file size.
    #[must_use]
    pub fn new<P: AsRef<Path>>(path: P, max_bytes: u64) -> Self {
        let path = path.as_ref();
        let directory = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        // Split on the final dot of the file name; dotless names rotate as
        // "<name>1", "<name>2", ...
        let (base_name, extension) = match file_name.rfind('.') {
            Some(dot) if dot > 0 => {
                let (base, ext) = file_name.split_at(dot);
                (base.to_string(), ext.to_string())
            }
            _ => (file_name, String::new()),
        };

        Self {
            current_path: path.to_path_buf(),
            directory,
            base_name,
            extension,
            max_bytes,
            current_bytes: 0,
        }
    }

    /// True once the threshold is reached.
    #[must_use]
    pub const fn should_rotate(&self) -> bool {
        self.current_bytes >= self.max_bytes
    }

    /// Account `bytes` of completed writes.
    pub fn advance(&mut self, bytes: u64) {
        self.current_bytes += bytes;
    }

    /// Bytes written to the active file since the last rotation.
    #[must_use]
    pub const fn current_bytes(&self) -> u64 {
        self.current_bytes
    }

    /// Reset the byte counter without rotating.
    pub fn reset(&mut self) {
        self.current_bytes = 0;
    }

    /// Path of the active (not yet rotated) file.
    #[must_use]
    pub fn current_path(&self) -> &Path {
        &self.current_path
    }

    /// Rename the active file aside and reset the counter.
    ///
    /// A missing active file is not an error: the counter still resets.
    ///
    /// # Errors
    ///
    /// Returns [`RotateError::Rename`] if the rename fails.
    pub fn rotate(&mut self) -> Result<(), RotateError> {
        if self.current_path.exists() {
            let target = self.next_rotated_path();
            std::fs::rename(&self.current_path, &target).map_err(|source| {
                RotateError::Rename {
                    from: self.current_path.clone(),
                    to: target,
                    source,
                }
            })?;
        }
        self.current_bytes = 0;
        Ok(())
    }

    /// Smallest-numbered rotation target not already present.
    fn next_rotated_path(&self) -> PathBuf {
        let mut counter: u32 = 1;
        loop {
            let candidate = self
                .directory
                .join(format!("{}{}{}", self.base_name, counter, self.extension));
            if !candidate.exists() {
                return candidate;
            }
            counter += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_threshold() {
        let mut rotater = FileRotater::new("output.log", 100);
        assert!(!rotater.should_rotate());
        rotater.advance(60);
        assert!(!rotater.should_rotate());
        rotater.advance(40);
        assert!(rotater.should_rotate());
        assert_eq!(rotater.current_bytes(), 100);
        rotater.reset();
        assert!(!rotater.should_rotate());
    }

    #[test]
    fn test_zero_threshold_always_rotates() {
        let rotater = FileRotater::new("output.log", 0);
        assert!(rotater.should_rotate());
    }

    #[test]
    fn test_rotate_renames_to_first_free_slot() {
        let dir = tempdir().unwrap();
        let active = dir.path().join("app.log");
        std::fs::write(&active, b"one").unwrap();

        let mut rotater = FileRotater::new(&active, 1);
        rotater.advance(3);
        rotater.rotate().unwrap();

        assert!(!active.exists());
        assert!(dir.path().join("app1.log").exists());
        assert_eq!(rotater.current_bytes(), 0);
        assert!(!rotater.should_rotate());

        // Second rotation skips the occupied slot.
        std::fs::write(&active, b"two").unwrap();
        rotater.advance(3);
        rotater.rotate().unwrap();
        assert!(dir.path().join("app2.log").exists());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("app1.log")).unwrap(),
            "one"
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join("app2.log")).unwrap(),
            "two"
        );
    }

    #[test]
    fn test_rotate_without_file_resets_only() {
        let dir = tempdir().unwrap();
        let active = dir.path().join("ghost.log");
        let mut rotater = FileRotater::new(&active, 10);
        rotater.advance(25);
        rotater.rotate().unwrap();
        assert_eq!(rotater.current_bytes(), 0);
        assert!(!dir.path().join("ghost1.log").exists());
    }

    #[test]
    fn test_dotless_name() {
        let dir = tempdir().unwrap();
        let active = dir.path().join("logfile");
        std::fs::write(&active, b"x").unwrap();

        let mut rotater = FileRotater::new(&active, 1);
        rotater.rotate().unwrap();
        assert!(dir.path().join("logfile1").exists());
    }

    #[test]
    fn test_extension_preserved() {
        let rotater = FileRotater::new("/var/log/service.name.log", 1);
        let target = rotater.next_rotated_path();
        assert_eq!(target, PathBuf::from("/var/log/service.name1.log"));
    }
}
