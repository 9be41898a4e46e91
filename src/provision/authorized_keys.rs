use std::fs::{self, DirBuilder, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::os::unix::fs::{DirBuilderExt, MetadataExt, OpenOptionsExt, fchown};
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::unistd::{Gid, Uid};

use crate::keys::decode_lines;

use super::{CommandExecutor, ProvisionError};

const SSH_DIR_MODE: u32 = 0o700;
const AUTHORIZED_KEYS_MODE: u32 = 0o600;
// O_NONBLOCK keeps a planted FIFO from blocking the open; check_regular rejects it after.
const FILE_FLAGS: OFlag = OFlag::O_NOFOLLOW.union(OFlag::O_NONBLOCK);

/// Numeric owner applied to the key directory and file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Owner {
    pub uid: Uid,
    pub gid: Gid,
}

pub fn ssh_dir(home: &Path) -> PathBuf {
    home.join(".ssh")
}

pub fn authorized_keys_path(home: &Path) -> PathBuf {
    ssh_dir(home).join("authorized_keys")
}

/// Read the lines of `~/.ssh/authorized_keys` under `home`. A missing file
/// reads as no keys.
///
/// Both path components are owned by the account, so neither may be a symlink.
pub fn read(home: &Path) -> Result<Vec<String>, ProvisionError> {
    let dir = ssh_dir(home);
    let path = authorized_keys_path(home);

    match fs::symlink_metadata(&dir) {
        Ok(_) => {
            open_dir(&dir)?;
        }
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(ProvisionError::io("inspecting", dir, err)),
    }

    let mut handle = match OpenOptions::new()
        .read(true)
        .custom_flags(FILE_FLAGS.bits())
        .open(&path)
    {
        Ok(handle) => handle,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(open_error(&path, err, "not a regular file")),
    };
    check_regular(&handle, &path)?;

    let mut contents = Vec::new();
    handle
        .read_to_end(&mut contents)
        .map_err(|err| ProvisionError::io("reading", &path, err))?;
    Ok(decode_lines(&contents, &path))
}

/// Append `block` to `~/.ssh/authorized_keys` under `home`, creating the
/// directory and file when needed. Existing content is never replaced.
///
/// `owner` is applied to both paths when given. `display_owner` is only used for
/// dry-run output, where the account may not exist yet. Symlinks and hard links
/// are refused and ownership is changed through open handles, never by path.
pub fn install(
    home: &Path,
    block: &str,
    owner: Option<Owner>,
    display_owner: &str,
    executor: &CommandExecutor,
) -> Result<(), ProvisionError> {
    let dir = ssh_dir(home);
    let file = authorized_keys_path(home);

    if executor.is_dry_run() {
        if !dir.exists() {
            executor.skip(&format!("mkdir -p -m 700 {}", dir.display()));
        }
        executor.skip(&format!("chown {0}: {1}", display_owner, dir.display()));
        if !file.exists() {
            executor.skip(&format!("install -m 600 /dev/null {}", file.display()));
        }
        executor.skip(&format!("chown {0}: {1}", display_owner, file.display()));
        let count = block.lines().count();
        executor.skip(&format!("append {} key(s) to {}", count, file.display()));
        return Ok(());
    }

    let dir_handle = ensure_dir(&dir)?;
    set_owner(&dir_handle, &dir, owner)?;

    let mut handle = OpenOptions::new()
        .create(true)
        .append(true)
        .mode(AUTHORIZED_KEYS_MODE)
        .custom_flags(FILE_FLAGS.bits())
        .open(&file)
        .map_err(|err| open_error(&file, err, "not a regular file"))?;
    check_regular(&handle, &file)?;

    // The directory must still be the one that was checked above.
    let now =
        fs::symlink_metadata(&dir).map_err(|err| ProvisionError::io("inspecting", &dir, err))?;
    let checked = dir_handle
        .metadata()
        .map_err(|err| ProvisionError::io("inspecting", &dir, err))?;
    if now.dev() != checked.dev() || now.ino() != checked.ino() {
        return Err(ProvisionError::UnsafePath {
            path: dir,
            reason: "replaced while in use",
        });
    }

    set_owner(&handle, &file, owner)?;
    handle
        .write_all(block.as_bytes())
        .map_err(|err| ProvisionError::io("appending keys to", &file, err))?;

    Ok(())
}

fn ensure_dir(dir: &Path) -> Result<File, ProvisionError> {
    match fs::symlink_metadata(dir) {
        Ok(_) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {
            DirBuilder::new()
                .recursive(true)
                .mode(SSH_DIR_MODE)
                .create(dir)
                .map_err(|err| ProvisionError::io("creating", dir, err))?;
        }
        Err(err) => return Err(ProvisionError::io("inspecting", dir, err)),
    }
    open_dir(dir)
}

/// Open a directory without following a symlink in its last component.
fn open_dir(dir: &Path) -> Result<File, ProvisionError> {
    OpenOptions::new()
        .read(true)
        .custom_flags((OFlag::O_NOFOLLOW | OFlag::O_DIRECTORY).bits())
        .open(dir)
        .map_err(|err| open_error(dir, err, "not a real directory"))
}

/// `O_NOFOLLOW` reports a symlink as `ELOOP`, `O_DIRECTORY` a file as `ENOTDIR`.
fn open_error(path: &Path, err: std::io::Error, reason: &'static str) -> ProvisionError {
    let refused = [Errno::ELOOP, Errno::ENOTDIR].map(|errno| errno as i32);
    match err.raw_os_error() {
        Some(code) if refused.contains(&code) => ProvisionError::UnsafePath {
            path: path.to_path_buf(),
            reason,
        },
        _ => ProvisionError::io("opening", path, err),
    }
}

fn check_regular(handle: &File, path: &Path) -> Result<(), ProvisionError> {
    let metadata = handle
        .metadata()
        .map_err(|err| ProvisionError::io("inspecting", path, err))?;
    if !metadata.is_file() {
        return Err(ProvisionError::UnsafePath {
            path: path.to_path_buf(),
            reason: "not a regular file",
        });
    }
    if metadata.nlink() > 1 {
        return Err(ProvisionError::UnsafePath {
            path: path.to_path_buf(),
            reason: "has more than one hard link",
        });
    }
    Ok(())
}

fn set_owner(handle: &File, path: &Path, owner: Option<Owner>) -> Result<(), ProvisionError> {
    let Some(owner) = owner else {
        return Ok(());
    };
    fchown(handle, Some(owner.uid.as_raw()), Some(owner.gid.as_raw()))
        .map_err(|err| ProvisionError::io("changing ownership of", path, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provision::ExecutionMode;
    use std::os::unix::fs::{PermissionsExt, symlink};

    fn live() -> CommandExecutor {
        CommandExecutor::new(ExecutionMode::Live)
    }

    fn mode_of(path: &Path) -> u32 {
        fs::metadata(path).unwrap().permissions().mode() & 0o777
    }

    #[test]
    fn test_install_creates_dir_and_file() {
        let home = tempfile::tempdir().unwrap();
        install(home.path(), "ssh-rsa AAAA a@x.com\n", None, "a", &live()).unwrap();

        let dir = ssh_dir(home.path());
        let file = authorized_keys_path(home.path());
        assert_eq!(fs::read_to_string(&file).unwrap(), "ssh-rsa AAAA a@x.com\n");
        assert_eq!(mode_of(&dir), 0o700);
        assert_eq!(mode_of(&file), 0o600);
    }

    #[test]
    fn test_install_appends_instead_of_replacing() {
        let home = tempfile::tempdir().unwrap();
        install(home.path(), "first\n", None, "a", &live()).unwrap();
        install(home.path(), "second\nthird\n", None, "a", &live()).unwrap();

        let contents = fs::read_to_string(authorized_keys_path(home.path())).unwrap();
        assert_eq!(contents, "first\nsecond\nthird\n");
    }

    #[test]
    fn test_install_with_current_owner() {
        let home = tempfile::tempdir().unwrap();
        let owner = Owner {
            uid: Uid::current(),
            gid: Gid::current(),
        };
        install(home.path(), "k\n", Some(owner), "me", &live()).unwrap();
        assert!(authorized_keys_path(home.path()).exists());
    }

    #[test]
    fn test_dry_run_install_touches_nothing() {
        let home = tempfile::tempdir().unwrap();
        let executor = CommandExecutor::new(ExecutionMode::DryRun);
        install(home.path(), "k\n", None, "a", &executor).unwrap();
        assert!(!ssh_dir(home.path()).exists());
    }

    #[test]
    fn test_read_missing_file_is_empty() {
        let home = tempfile::tempdir().unwrap();
        assert!(read(home.path()).unwrap().is_empty());
    }

    #[test]
    fn test_read_existing_lines() {
        let home = tempfile::tempdir().unwrap();
        install(home.path(), "one\ntwo\n", None, "a", &live()).unwrap();
        assert_eq!(read(home.path()).unwrap(), vec!["one", "two"]);
    }

    fn assert_refused(result: Result<(), ProvisionError>) {
        match result {
            Err(ProvisionError::UnsafePath { .. }) => {}
            other => panic!("expected an unsafe path error, got {other:?}"),
        }
    }

    #[test]
    fn test_install_refuses_symlinked_file() {
        let root = tempfile::tempdir().unwrap();
        let home = root.path().join("home");
        let target = root.path().join("shadow");
        fs::write(&target, "root:secret\n").unwrap();
        fs::create_dir_all(ssh_dir(&home)).unwrap();
        symlink(&target, authorized_keys_path(&home)).unwrap();

        let owner = Owner {
            uid: Uid::current(),
            gid: Gid::current(),
        };
        let result = install(&home, "ssh-rsa EVIL x@y.com\n", Some(owner), "x", &live());

        assert_refused(result);
        assert_eq!(fs::read_to_string(&target).unwrap(), "root:secret\n");
    }

    #[test]
    fn test_install_refuses_symlinked_ssh_dir() {
        let root = tempfile::tempdir().unwrap();
        let home = root.path().join("home");
        let elsewhere = root.path().join("etc");
        fs::create_dir_all(&home).unwrap();
        fs::create_dir_all(&elsewhere).unwrap();
        symlink(&elsewhere, ssh_dir(&home)).unwrap();

        assert_refused(install(&home, "k\n", None, "x", &live()));
        assert!(!elsewhere.join("authorized_keys").exists());
    }

    #[test]
    fn test_install_refuses_hard_linked_file() {
        let root = tempfile::tempdir().unwrap();
        let home = root.path().join("home");
        let target = root.path().join("sudoers");
        fs::write(&target, "Defaults env_reset\n").unwrap();
        fs::create_dir_all(ssh_dir(&home)).unwrap();
        fs::hard_link(&target, authorized_keys_path(&home)).unwrap();

        assert_refused(install(&home, "k\n", None, "x", &live()));
        assert_eq!(fs::read_to_string(&target).unwrap(), "Defaults env_reset\n");
    }

    #[test]
    fn test_install_refuses_fifo() {
        let home = tempfile::tempdir().unwrap();
        fs::create_dir_all(ssh_dir(home.path())).unwrap();
        nix::unistd::mkfifo(
            &authorized_keys_path(home.path()),
            nix::sys::stat::Mode::from_bits_truncate(0o600),
        )
        .unwrap();

        assert!(install(home.path(), "k\n", None, "x", &live()).is_err());
    }

    #[test]
    fn test_read_refuses_symlinked_file() {
        let root = tempfile::tempdir().unwrap();
        let home = root.path().join("home");
        let target = root.path().join("keys");
        fs::write(&target, "ssh-rsa AAAA x@y.com\n").unwrap();
        fs::create_dir_all(ssh_dir(&home)).unwrap();
        symlink(&target, authorized_keys_path(&home)).unwrap();

        assert!(matches!(
            read(&home),
            Err(ProvisionError::UnsafePath { .. })
        ));
    }

    #[test]
    fn test_read_keeps_lines_around_invalid_utf8() {
        let home = tempfile::tempdir().unwrap();
        fs::create_dir_all(ssh_dir(home.path())).unwrap();
        fs::write(
            authorized_keys_path(home.path()),
            b"ssh-rsa AAAA bob@example.com\nssh-rsa BBBB caf\xe9@example.com\n",
        )
        .unwrap();

        let lines = read(home.path()).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "ssh-rsa AAAA bob@example.com");
    }
}
