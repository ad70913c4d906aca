use std::ffi::OsStr;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use log::{debug, info, warn};
use tempfile::NamedTempFile;

use crate::sidecar::sidecar_path;
use crate::template::FilenameTemplate;

/// How files reach their destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferMode {
    /// Report what would happen, touch nothing.
    pub dry_run: bool,
    /// Leave the original in place and symlink to it from the destination.
    pub symlink_only: bool,
}

/// Where a file (and its sidecar, if it had one) ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocation {
    pub file: PathBuf,
    pub sidecar: Option<PathBuf>,
}

fn occupied(path: &Path) -> bool {
    // symlink_metadata so that dangling links also count
    path.symlink_metadata().is_ok()
}

fn split_name(basename: &str) -> (&str, &str) {
    match basename.rfind('.') {
        Some(idx) if idx > 0 => (&basename[..idx], &basename[idx..]),
        _ => (basename, ""),
    }
}

/// First free `<stem> (<n>)<ext>` in `folder`, starting with `basename` itself.
///
/// A name is only free when neither the file nor its sidecar exists.
pub fn unique_destination(folder: &Path, basename: &str, metadata_extension: &str) -> PathBuf {
    let (stem, ext) = split_name(basename);
    let mut candidate = folder.join(basename);
    let mut counter = 0;
    while occupied(&candidate) || occupied(&sidecar_path(&candidate, metadata_extension)) {
        counter += 1;
        candidate = folder.join(format!("{stem} ({counter}){ext}"));
    }
    candidate
}

// rename, falling back to copy + delete when the rename cannot be done in place
fn move_file(src: &Path, dst: &Path) -> Result<()> {
    match fs::rename(src, dst) {
        Ok(_) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            Err(err).with_context(|| format!("moving {:?}", src))
        }
        Err(err) => {
            debug!("rename {:?} -> {:?} failed ({err}), copying instead", src, dst);
            if let Err(copy_err) = fs::copy(src, dst) {
                let _ = fs::remove_file(dst);
                return Err(copy_err).with_context(|| format!("copying {:?} to {:?}", src, dst));
            }
            if let Err(remove_err) = fs::remove_file(src) {
                let _ = fs::remove_file(dst);
                return Err(remove_err).with_context(|| format!("removing {:?} after copy", src));
            }
            Ok(())
        }
    }
}

#[cfg(unix)]
fn make_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn make_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

/// Moves or links `src` to `dst`, creating missing parent folders. Never
/// overwrites an existing `dst`.
pub fn move_or_link_file(src: &Path, dst: &Path, mode: TransferMode) -> Result<()> {
    if mode.dry_run {
        debug!("DRY RUN: {:?} is not moved to {:?}", src, dst);
        return Ok(());
    }
    if occupied(dst) {
        bail!("destination {:?} already exists", dst);
    }
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating folder {:?}", parent))?;
    }
    if mode.symlink_only {
        let target = fs::canonicalize(src).with_context(|| format!("resolving {:?}", src))?;
        make_symlink(&target, dst).with_context(|| format!("linking {:?} -> {:?}", dst, target))
    } else {
        move_file(src, dst)
    }
}

fn undo(src: &Path, dst: &Path, mode: TransferMode) {
    if mode.dry_run {
        return;
    }
    let restored = if mode.symlink_only {
        fs::remove_file(dst).map_err(anyhow::Error::from)
    } else {
        move_file(dst, src)
    };
    if let Err(e) = restored {
        warn!("could not roll back {:?} -> {:?}: {e:#}", dst, src);
    }
}

fn file_name(path: &Path) -> Result<&str> {
    path.file_name()
        .and_then(OsStr::to_str)
        .ok_or_else(|| anyhow!("{:?} has no usable file name", path))
}

/// Moves or links `source` and its sidecar into `dest_dir` under a collision-free name.
///
/// Both destinations are computed before anything is touched; if the sidecar
/// cannot follow, the file is put back.
pub fn relocate(
    source: &Path,
    dest_dir: &Path,
    metadata_extension: &str,
    mode: TransferMode,
) -> Result<Relocation> {
    let basename = file_name(source)?;
    if !mode.dry_run {
        fs::create_dir_all(dest_dir).with_context(|| format!("creating folder {:?}", dest_dir))?;
    }
    let dest = unique_destination(dest_dir, basename, metadata_extension);
    let source_sidecar = sidecar_path(source, metadata_extension);
    let has_sidecar = source_sidecar.is_file();
    let dest_sidecar = sidecar_path(&dest, metadata_extension);

    info!("Moving file '{}' to '{}'...", source.display(), dest.display());
    move_or_link_file(source, &dest, mode)?;
    if !has_sidecar {
        return Ok(Relocation { file: dest, sidecar: None });
    }
    info!(
        "Moving file '{}' to '{}'...",
        source_sidecar.display(),
        dest_sidecar.display()
    );
    if let Err(e) = move_or_link_file(&source_sidecar, &dest_sidecar, mode) {
        undo(source, &dest, mode);
        return Err(e);
    }
    Ok(Relocation {
        file: dest,
        sidecar: Some(dest_sidecar),
    })
}

/// Moves `source` to exactly `target` and drops its sidecar.
///
/// Used for operator-typed destinations; applies regardless of dry-run or
/// symlink settings.
pub fn move_to_path(source: &Path, target: &Path, metadata_extension: &str) -> Result<()> {
    if occupied(target) {
        bail!("{:?} already exists, not overwriting it", target);
    }
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating folder {:?}", parent))?;
    }
    move_file(source, target)?;
    let sidecar = sidecar_path(source, metadata_extension);
    if sidecar.is_file() {
        info!("Removing metadata '{}'...", sidecar.display());
        fs::remove_file(&sidecar).with_context(|| format!("removing {:?}", sidecar))?;
    }
    Ok(())
}

/// Places `file` inside `folder` under the name the template builds from the
/// fetched metadata, which becomes the file's new sidecar.
///
/// `metadata` should live on the same filesystem as `folder` so it can be
/// renamed into place.
pub fn organize_with_metadata(
    file: &Path,
    folder: &Path,
    metadata: NamedTempFile,
    template: &FilenameTemplate,
    metadata_extension: &str,
    mode: TransferMode,
) -> Result<PathBuf> {
    let text = fs::read_to_string(metadata.path())
        .with_context(|| format!("reading fetched metadata {:?}", metadata.path()))?;
    let extension = file
        .extension()
        .and_then(OsStr::to_str)
        .unwrap_or_default();
    let name = template.render(&text, extension)?;

    let dest = if folder.join(&name) == file {
        file.to_path_buf()
    } else {
        unique_destination(folder, &name, metadata_extension)
    };
    if dest != file {
        info!("Moving file '{}' to '{}'...", file.display(), dest.display());
        move_or_link_file(file, &dest, mode)?;
    }
    let dest_sidecar = sidecar_path(&dest, metadata_extension);
    if mode.dry_run {
        debug!("DRY RUN: metadata not saved to {:?}", dest_sidecar);
        return Ok(dest);
    }
    info!("Saving metadata to '{}'...", dest_sidecar.display());
    if let Err(e) = metadata.persist(&dest_sidecar) {
        fs::copy(e.file.path(), &dest_sidecar)
            .with_context(|| format!("saving metadata {:?}", dest_sidecar))?;
    }
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const EXT: &str = "meta";

    fn touch(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn never_overwrites_same_named_file() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("in/Book.pdf");
        let out = tmp.path().join("out");
        touch(&src, "new");
        touch(&out.join("Book.pdf"), "old");
        touch(&out.join("Book (1).pdf.meta"), "stray sidecar");

        let moved = relocate(&src, &out, EXT, TransferMode::default()).unwrap();
        assert_eq!(moved.file, out.join("Book (2).pdf"));
        assert_eq!(fs::read_to_string(out.join("Book.pdf")).unwrap(), "old");
        assert_eq!(fs::read_to_string(&moved.file).unwrap(), "new");
        assert!(!src.exists());
    }

    #[test]
    fn rollback_puts_the_file_back() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("in/Book.pdf");
        let out = tmp.path().join("out");
        touch(&src, "book");
        let dest = unique_destination(&out, "Book.pdf", EXT);

        move_or_link_file(&src, &dest, TransferMode::default()).unwrap();
        assert!(dest.is_file());
        undo(&src, &dest, TransferMode::default());

        assert_eq!(fs::read_to_string(&src).unwrap(), "book");
        assert_eq!(fs::read_dir(&out).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn rollback_removes_the_link() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("in/Book.pdf");
        let out = tmp.path().join("out");
        touch(&src, "book");
        let mode = TransferMode { dry_run: false, symlink_only: true };
        let dest = out.join("Book.pdf");

        move_or_link_file(&src, &dest, mode).unwrap();
        assert!(dest.symlink_metadata().unwrap().file_type().is_symlink());
        undo(&src, &dest, mode);

        assert!(src.is_file());
        assert_eq!(fs::read_dir(&out).unwrap().count(), 0);
    }

    #[test]
    fn sidecar_follows_the_file() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("in/Book.pdf");
        let out = tmp.path().join("out");
        touch(&src, "book");
        touch(&sidecar_path(&src, EXT), "Old file path : /x/Book.pdf");

        let moved = relocate(&src, &out, EXT, TransferMode::default()).unwrap();
        assert_eq!(moved.sidecar, Some(out.join("Book.pdf.meta")));
        assert!(out.join("Book.pdf.meta").is_file());
        assert!(!sidecar_path(&src, EXT).exists());
    }

    #[test]
    fn dry_run_touches_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("in/Book.pdf");
        let out = tmp.path().join("out");
        touch(&src, "book");
        touch(&sidecar_path(&src, EXT), "meta");

        let mode = TransferMode { dry_run: true, symlink_only: false };
        let moved = relocate(&src, &out, EXT, mode).unwrap();
        assert_eq!(moved.file, out.join("Book.pdf"));
        assert!(!out.exists());
        assert!(src.exists());
        assert!(sidecar_path(&src, EXT).exists());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_only_keeps_original() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("in/Book.pdf");
        let out = tmp.path().join("out");
        touch(&src, "book");

        let mode = TransferMode { dry_run: false, symlink_only: true };
        let moved = relocate(&src, &out, EXT, mode).unwrap();
        assert!(src.is_file());
        let meta = fs::symlink_metadata(&moved.file).unwrap();
        assert!(meta.file_type().is_symlink());
        assert_eq!(fs::read_link(&moved.file).unwrap(), fs::canonicalize(&src).unwrap());
    }

    #[test]
    fn move_to_path_creates_parents_and_drops_sidecar() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("Book.pdf");
        touch(&src, "book");
        touch(&sidecar_path(&src, EXT), "meta");
        let target = tmp.path().join("a/b/Renamed.pdf");

        move_to_path(&src, &target, EXT).unwrap();
        assert!(target.is_file());
        assert!(!src.exists());
        assert!(!sidecar_path(&src, EXT).exists());
    }

    #[test]
    fn move_to_path_refuses_to_overwrite() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("Book.pdf");
        let target = tmp.path().join("Other.pdf");
        touch(&src, "book");
        touch(&target, "other");

        assert!(move_to_path(&src, &target, EXT).is_err());
        assert!(src.is_file());
        assert_eq!(fs::read_to_string(&target).unwrap(), "other");
    }

    #[test]
    fn organize_renames_from_metadata_and_saves_sidecar() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("scan0001.pdf");
        touch(&src, "book");
        let mut buffer = NamedTempFile::new_in(tmp.path()).unwrap();
        write!(
            buffer,
            "Title               : Introduction to Algorithms\n\
             Author(s)           : Thomas H. Cormen & Charles E. Leiserson\n\
             Published           : 2009-07-31T00:00:00+00:00\n\
             ISBN                : 9780262033848\n"
        )
        .unwrap();

        let dest = organize_with_metadata(
            &src,
            tmp.path(),
            buffer,
            &FilenameTemplate::default(),
            EXT,
            TransferMode::default(),
        )
        .unwrap();
        assert_eq!(
            dest.file_name().unwrap().to_str().unwrap(),
            "Thomas H. Cormen, Charles E. Leiserson - Introduction to Algorithms (2009) [9780262033848].pdf"
        );
        assert!(dest.is_file());
        let sidecar = fs::read_to_string(sidecar_path(&dest, EXT)).unwrap();
        assert!(sidecar.contains("Introduction to Algorithms"));
        assert!(!src.exists());
    }
}
