//! Offset-based reads of headerless little-endian f16 representation files.

use crate::error::{DataError, DataResult};
use crate::feature::Compression;
use half::f16;
use ndarray::{s, Array2};
use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Bytes per stored value.
pub const F16_BYTES: usize = 2;

/// Which rows of the file a read covers when the file is long enough.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadWindow {
    /// Every frame of the file (`total_frames` rows).
    Full,
    /// Exactly `patch_width` rows starting at `byte_offset`.
    Patch { byte_offset: u64 },
}

#[derive(Debug, Clone, Copy)]
pub struct ReadRequest<'a> {
    pub path: &'a Path,
    pub patch_width: usize,
    pub bands: usize,
    pub total_frames: usize,
    pub window: ReadWindow,
    pub compression: Compression,
}

/// Number of frames stored in a representation file with `bands` columns.
pub fn frame_count(path: &Path, bands: usize) -> DataResult<usize> {
    let bytes = std::fs::metadata(path)
        .map_err(|source| DataError::Read { path: path.to_path_buf(), source })?
        .len();
    let row_bytes = (bands * F16_BYTES) as u64;
    if row_bytes == 0 || bytes % row_bytes != 0 {
        return Err(DataError::MalformedSize { path: path.to_path_buf(), bytes, bands });
    }
    Ok((bytes / row_bytes) as usize)
}

/// Reads a representation window, zero-padding items shorter than a patch.
///
/// When `total_frames < patch_width` the window is ignored: all frames are
/// read and rows `[total_frames, patch_width)` are zeros. Compression is
/// applied last, so padding rows are compressed too.
pub fn read_representation(req: &ReadRequest<'_>) -> DataResult<Array2<f32>> {
    let mut rep = if req.total_frames < req.patch_width {
        let data = read_rows(req.path, req.bands, 0, req.total_frames)?;
        let mut padded = Array2::<f32>::zeros((req.patch_width, req.bands));
        padded.slice_mut(s![..req.total_frames, ..]).assign(&data);
        padded
    } else {
        match req.window {
            ReadWindow::Patch { byte_offset } => {
                read_rows(req.path, req.bands, byte_offset, req.patch_width)?
            }
            ReadWindow::Full => read_rows(req.path, req.bands, 0, req.total_frames)?,
        }
    };
    req.compression.apply(&mut rep);
    Ok(rep)
}

/// Reads `rows` consecutive frames starting at `byte_offset`.
pub fn read_rows(path: &Path, bands: usize, byte_offset: u64, rows: usize) -> DataResult<Array2<f32>> {
    let mut file = File::open(path).map_err(|source| DataError::Read { path: path.to_path_buf(), source })?;
    file.seek(SeekFrom::Start(byte_offset))?;

    let mut buf = vec![0u8; rows * bands * F16_BYTES];
    if let Err(e) = file.read_exact(&mut buf) {
        return Err(if e.kind() == ErrorKind::UnexpectedEof {
            DataError::OutOfRange { path: path.to_path_buf(), byte_offset, rows }
        } else {
            DataError::Read { path: path.to_path_buf(), source: e }
        });
    }

    let values: Vec<f32> = buf
        .chunks_exact(F16_BYTES)
        .map(|b| f16::from_le_bytes([b[0], b[1]]).to_f32())
        .collect();
    Ok(Array2::from_shape_vec((rows, bands), values)?)
}

/// Writes `rep` (frames × bands) in the on-disk representation format.
pub fn write_representation(path: &Path, rep: &Array2<f32>) -> DataResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut bytes = Vec::with_capacity(rep.len() * F16_BYTES);
    for &v in rep {
        bytes.extend_from_slice(&f16::from_f32(v).to_le_bytes());
    }
    let mut file = File::create(path)?;
    file.write_all(&bytes)?;
    Ok(())
}
