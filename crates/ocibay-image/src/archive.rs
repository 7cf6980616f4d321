//! Tar and gzip helpers for archive assembly.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::Result;

/// Gzip magic bytes.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Decompresses `src` into `dest`, or copies it verbatim when it is not
/// gzipped.
///
/// Some registries serve foreign layers uncompressed; the magic sniff keeps
/// those working without a separate code path.
///
/// # Errors
///
/// Returns an error when either file cannot be opened or the copy fails.
pub fn decompress(src: &Path, dest: &Path) -> Result<()> {
    let mut input = File::open(src)?;

    let mut magic = [0u8; 2];
    let is_gzip = match input.read_exact(&mut magic) {
        Ok(()) => magic == GZIP_MAGIC,
        Err(_) => false,
    };
    input.seek(SeekFrom::Start(0))?;

    let mut output = File::create(dest)?;
    if is_gzip {
        io::copy(&mut GzDecoder::new(input), &mut output)?;
    } else {
        io::copy(&mut input, &mut output)?;
    }
    Ok(())
}

/// Streams the contents of `src_dir` into a gzip-compressed tar written to
/// `writer`, using best compression.
///
/// Entry names are relative to `src_dir`; the root directory itself yields
/// no entry.
///
/// # Errors
///
/// Returns an error when the walk or a write fails.
pub fn create_tar_gz<W: Write>(src_dir: &Path, writer: W) -> Result<()> {
    let encoder = GzEncoder::new(writer, Compression::best());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);

    append_dir(&mut builder, src_dir, src_dir)?;

    builder.into_inner()?.finish()?;
    Ok(())
}

fn append_dir<W: Write>(builder: &mut tar::Builder<W>, root: &Path, dir: &Path) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };

        if entry.file_type()?.is_dir() {
            builder.append_dir(relative, &path)?;
            append_dir(builder, root, &path)?;
        } else {
            builder.append_path_with_name(&path, relative)?;
        }
    }
    Ok(())
}
