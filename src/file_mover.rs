//! Filesystem seams: moving files and measuring free space.

use crate::conflict::ConflictResolver;
use crate::error::FileErrorKind;
use crate::safety::PathSafetyValidator;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// How many times a move is re-planned after losing a name race.
pub const MAX_MOVE_ATTEMPTS: usize = 3;

pub trait FileMover: Send + Sync {
    /// Moves `source` to `destination`, creating missing parents.
    ///
    /// Must fail with `AlreadyExists` instead of overwriting.
    fn move_file(&self, source: &Path, destination: &Path) -> io::Result<()>;
}

pub trait DiskSpaceChecker: Send + Sync {
    /// Bytes available to the current user on the volume holding `path`.
    fn free_bytes(&self, path: &Path) -> io::Result<u64>;
}

/// Hard link then unlink, so an occupied destination fails atomically with
/// `AlreadyExists`. Falls back to an exclusive copy across devices, and to
/// check-then-rename on filesystems without hard links.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsFileMover;

impl FsFileMover {
    pub fn new() -> Self {
        Self
    }

    fn link_then_unlink(source: &Path, destination: &Path) -> io::Result<()> {
        fs::hard_link(source, destination)?;
        if let Err(e) = fs::remove_file(source) {
            let _ = fs::remove_file(destination);
            return Err(e);
        }
        Ok(())
    }

    fn copy_then_remove(source: &Path, destination: &Path) -> io::Result<()> {
        let mut reader = File::open(source)?;
        let permissions = reader.metadata()?.permissions();
        let mut writer = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(destination)?;

        let copied = io::copy(&mut reader, &mut writer)
            .and_then(|_| writer.sync_all())
            .and_then(|()| fs::set_permissions(destination, permissions))
            .and_then(|()| fs::remove_file(source));
        if let Err(e) = copied {
            // Never leave two copies behind.
            let _ = fs::remove_file(destination);
            return Err(e);
        }
        Ok(())
    }

    fn check_then_rename(source: &Path, destination: &Path) -> io::Result<()> {
        if destination.symlink_metadata().is_ok() {
            return Err(already_exists());
        }
        match fs::rename(source, destination) {
            Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
                Self::copy_then_remove(source, destination)
            }
            other => other,
        }
    }
}

fn already_exists() -> io::Error {
    io::Error::new(io::ErrorKind::AlreadyExists, "destination already exists")
}

impl FileMover for FsFileMover {
    fn move_file(&self, source: &Path, destination: &Path) -> io::Result<()> {
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }

        match Self::link_then_unlink(source, destination) {
            Ok(()) => Ok(()),
            Err(e) => match e.kind() {
                io::ErrorKind::AlreadyExists | io::ErrorKind::NotFound => Err(e),
                io::ErrorKind::CrossesDevices => Self::copy_then_remove(source, destination),
                _ => {
                    debug!(error = %e, "hard link unavailable; renaming");
                    Self::check_then_rename(source, destination)
                }
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FsDiskSpaceChecker;

impl FsDiskSpaceChecker {
    pub fn new() -> Self {
        Self
    }
}

impl DiskSpaceChecker for FsDiskSpaceChecker {
    fn free_bytes(&self, path: &Path) -> io::Result<u64> {
        fs2::available_space(path)
    }
}

/// Resolves, validates and moves one file, re-resolving when the chosen
/// name gets taken between planning and the move.
///
/// On failure returns the last planned destination with the error kind.
pub fn place_file(
    mover: &dyn FileMover,
    resolver: &ConflictResolver,
    validator: &PathSafetyValidator,
    source: &Path,
    desired: &Path,
) -> Result<PathBuf, (PathBuf, FileErrorKind)> {
    let mut destination = desired.to_path_buf();

    for attempt in 1..=MAX_MOVE_ATTEMPTS {
        if source.symlink_metadata().is_err() {
            return Err((destination, FileErrorKind::SourceMissing));
        }

        destination = resolver.resolve(desired);
        validator
            .validate(&destination)
            .map_err(|reason| (destination.clone(), FileErrorKind::UnsafeDestination(reason)))?;

        match mover.move_file(source, &destination) {
            Ok(()) => return Ok(destination),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                debug!(attempt, "destination taken at move time; re-resolving");
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound && !source.exists() => {
                return Err((destination, FileErrorKind::SourceMissing));
            }
            Err(e) => return Err((destination, FileErrorKind::from_io(&e))),
        }
    }

    Err((destination, FileErrorKind::DestinationConflict))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[test]
    fn test_move_creates_parents() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("a.txt");
        fs::write(&source, b"data").expect("Failed to write file");
        let destination = temp_dir.path().join("x").join("y").join("a.txt");

        FsFileMover::new()
            .move_file(&source, &destination)
            .expect("move should succeed");
        assert!(!source.exists());
        assert_eq!(fs::read(&destination).unwrap(), b"data");
    }

    #[test]
    fn test_move_refuses_to_overwrite() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("a.txt");
        let destination = temp_dir.path().join("b.txt");
        fs::write(&source, b"new").expect("Failed to write file");
        fs::write(&destination, b"old").expect("Failed to write file");

        let err = FsFileMover::new()
            .move_file(&source, &destination)
            .expect_err("must not overwrite");
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read(&destination).unwrap(), b"old");
        assert!(source.exists());
    }

    #[test]
    fn test_move_refuses_dangling_symlink_destination() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("a.txt");
        fs::write(&source, b"new").expect("Failed to write file");
        let destination = temp_dir.path().join("b.txt");
        #[cfg(unix)]
        std::os::unix::fs::symlink(temp_dir.path().join("nowhere"), &destination)
            .expect("Failed to create symlink");
        #[cfg(not(unix))]
        fs::write(&destination, b"old").expect("Failed to write file");

        let err = FsFileMover::new()
            .move_file(&source, &destination)
            .expect_err("must not replace the link");
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert!(destination.symlink_metadata().is_ok());
        assert_eq!(fs::read(&source).unwrap(), b"new");
    }

    #[test]
    fn test_copy_fallback_is_exclusive() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("a.txt");
        let destination = temp_dir.path().join("b.txt");
        fs::write(&source, b"new").expect("Failed to write file");
        fs::write(&destination, b"old").expect("Failed to write file");

        let err = FsFileMover::copy_then_remove(&source, &destination)
            .expect_err("must not overwrite");
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read(&destination).unwrap(), b"old");
        assert!(source.exists());

        fs::remove_file(&destination).expect("Failed to remove file");
        FsFileMover::copy_then_remove(&source, &destination).expect("copy should succeed");
        assert!(!source.exists());
        assert_eq!(fs::read(&destination).unwrap(), b"new");
    }

    #[test]
    fn test_move_missing_source_is_not_found() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let err = FsFileMover::new()
            .move_file(&temp_dir.path().join("gone"), &temp_dir.path().join("out"))
            .expect_err("nothing to move");
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(!temp_dir.path().join("out").exists());
    }

    #[test]
    fn test_free_bytes_for_existing_dir() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        assert!(FsDiskSpaceChecker::new().free_bytes(temp_dir.path()).is_ok());
    }

    /// Occupies the planned destination the first `races` times it is asked
    /// to move, simulating another process grabbing the name.
    struct RacingMover {
        races: Mutex<usize>,
    }

    impl FileMover for RacingMover {
        fn move_file(&self, source: &Path, destination: &Path) -> io::Result<()> {
            let mut races = self.races.lock().unwrap();
            if *races > 0 {
                *races -= 1;
                fs::write(destination, b"intruder")?;
                return Err(io::Error::new(io::ErrorKind::AlreadyExists, "raced"));
            }
            FsFileMover.move_file(source, destination)
        }
    }

    #[test]
    fn test_place_file_retries_after_race() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("photo.jpg");
        fs::write(&source, b"img").expect("Failed to write file");
        let desired = temp_dir.path().join("out").join("photo.jpg");
        fs::create_dir(temp_dir.path().join("out")).expect("Failed to create dir");

        let mover = RacingMover {
            races: Mutex::new(1),
        };
        let landed = place_file(
            &mover,
            &ConflictResolver::new(),
            &PathSafetyValidator::default(),
            &source,
            &desired,
        )
        .expect("second attempt should land");
        assert_eq!(landed, temp_dir.path().join("out").join("photo_1.jpg"));
        assert_eq!(fs::read(&landed).unwrap(), b"img");
    }

    #[test]
    fn test_place_file_gives_up_after_max_attempts() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("photo.jpg");
        fs::write(&source, b"img").expect("Failed to write file");
        fs::create_dir(temp_dir.path().join("out")).expect("Failed to create dir");

        let mover = RacingMover {
            races: Mutex::new(MAX_MOVE_ATTEMPTS),
        };
        let (_, kind) = place_file(
            &mover,
            &ConflictResolver::new(),
            &PathSafetyValidator::default(),
            &source,
            &temp_dir.path().join("out").join("photo.jpg"),
        )
        .expect_err("every attempt loses the race");
        assert_eq!(kind, FileErrorKind::DestinationConflict);
        assert!(source.exists());
    }

    #[test]
    fn test_place_file_missing_source() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let (_, kind) = place_file(
            &FsFileMover,
            &ConflictResolver::new(),
            &PathSafetyValidator::default(),
            &temp_dir.path().join("gone.txt"),
            &temp_dir.path().join("out").join("gone.txt"),
        )
        .expect_err("source does not exist");
        assert_eq!(kind, FileErrorKind::SourceMissing);
    }

    #[test]
    fn test_place_file_rejects_unsafe_destination() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("CON.txt");
        fs::write(&source, b"x").expect("Failed to write file");

        let (planned, kind) = place_file(
            &FsFileMover,
            &ConflictResolver::new(),
            &PathSafetyValidator::default(),
            &source,
            &temp_dir.path().join("out").join("CON.txt"),
        )
        .expect_err("reserved name");
        assert_eq!(
            kind,
            FileErrorKind::UnsafeDestination(crate::error::RejectionReason::ReservedName)
        );
        assert_eq!(planned, temp_dir.path().join("out").join("CON.txt"));
        assert!(source.exists());
    }
}
