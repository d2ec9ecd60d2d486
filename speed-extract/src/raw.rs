//! Raw frame stream parsing
//!
//! A minimal uncompressed container for test clips: a little-endian header
//! (`VSDR` magic, width, height, fps, frame count) followed by tightly
//! packed luminance planes, one byte per pixel. Not a codec.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use vsd::prelude::v1::*;

const MAGIC: [u8; 4] = *b"VSDR";

/// magic + width + height + fps + frame count.
const HEADER_LEN: u64 = 4 + 4 + 4 + 8 + 4;

/// Frame source backed by a raw `.vsdraw` stream.
pub struct RawSource<R> {
    reader: R,
    width: usize,
    height: usize,
    fps: f64,
    frame_count: usize,
    next_index: usize,
}

impl RawSource<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read + Seek> RawSource<R> {
    pub fn new(mut reader: R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic).context("truncated header")?;
        ensure!(magic == MAGIC, "not a raw frame stream (bad magic)");

        let width = read_u32(&mut reader)? as usize;
        let height = read_u32(&mut reader)? as usize;
        let fps = read_f64(&mut reader)?;
        let frame_count = read_u32(&mut reader)? as usize;

        ensure!(width > 0 && height > 0, "degenerate frame size in header");
        ensure!(fps > 0.0, "non-positive framerate in header");

        Ok(Self {
            reader,
            width,
            height,
            fps,
            frame_count,
            next_index: 0,
        })
    }
}

impl<R: Read + Seek + Send> FrameSource for RawSource<R> {
    fn read_frame(&mut self) -> Result<Option<Frame>> {
        if self.next_index >= self.frame_count {
            return Ok(None);
        }

        let mut luma = vec![0u8; self.width * self.height];
        match self.reader.read_exact(&mut luma) {
            Ok(()) => {}
            // A truncated stream simply ends early.
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(err) => return Err(err).context("frame read failed"),
        }

        let frame = Frame::from_luma(&luma, self.width, self.height, self.next_index)?;
        self.next_index += 1;

        Ok(Some(frame))
    }

    fn frame_count(&self) -> Option<usize> {
        Some(self.frame_count)
    }

    fn framerate(&self) -> Option<f64> {
        Some(self.fps)
    }

    fn frame_size(&self) -> Option<(usize, usize)> {
        Some((self.width, self.height))
    }

    fn seek(&mut self, frame_idx: usize) -> Result<()> {
        ensure!(frame_idx <= self.frame_count, "seek past end of stream");

        let offset = HEADER_LEN + (frame_idx * self.width * self.height) as u64;
        self.reader.seek(SeekFrom::Start(offset))?;
        self.next_index = frame_idx;

        Ok(())
    }
}

fn read_u32(reader: &mut impl Read) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf).context("truncated header")?;
    Ok(u32::from_le_bytes(buf))
}

fn read_f64(reader: &mut impl Read) -> Result<f64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf).context("truncated header")?;
    Ok(f64::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn stream(width: u32, height: u32, fps: f64, frames: &[&[u8]]) -> Vec<u8> {
        let mut data = vec![];
        data.extend_from_slice(&MAGIC);
        data.extend_from_slice(&width.to_le_bytes());
        data.extend_from_slice(&height.to_le_bytes());
        data.extend_from_slice(&fps.to_le_bytes());
        data.extend_from_slice(&(frames.len() as u32).to_le_bytes());
        for frame in frames {
            data.extend_from_slice(frame);
        }
        data
    }

    #[test]
    fn header_roundtrip() {
        let data = stream(2, 2, 25.0, &[&[0, 1, 2, 3], &[4, 5, 6, 7]]);
        let source = RawSource::new(Cursor::new(data)).unwrap();

        assert_eq!(source.frame_size(), Some((2, 2)));
        assert_eq!(source.framerate(), Some(25.0));
        assert_eq!(FrameSource::frame_count(&source), Some(2));
    }

    #[test]
    fn frames_read_in_order() {
        let data = stream(2, 2, 25.0, &[&[0, 1, 2, 3], &[4, 5, 6, 7]]);
        let mut source = RawSource::new(Cursor::new(data)).unwrap();

        let first = source.read_frame().unwrap().unwrap();
        assert_eq!(first.index(), 0);
        assert_eq!(first.luma_at(1, 1) as u8, 3);

        let second = source.read_frame().unwrap().unwrap();
        assert_eq!(second.index(), 1);
        assert_eq!(second.luma_at(0, 0) as u8, 4);

        assert!(source.read_frame().unwrap().is_none());
    }

    #[test]
    fn seek_by_frame_index() {
        let data = stream(2, 2, 25.0, &[&[0, 1, 2, 3], &[4, 5, 6, 7]]);
        let mut source = RawSource::new(Cursor::new(data)).unwrap();

        source.read_frame().unwrap().unwrap();
        source.seek(0).unwrap();
        let again = source.read_frame().unwrap().unwrap();
        assert_eq!(again.index(), 0);
        assert_eq!(again.luma_at(0, 0) as u8, 0);

        source.seek(1).unwrap();
        assert_eq!(source.read_frame().unwrap().unwrap().index(), 1);
        assert!(source.seek(5).is_err());
    }

    #[test]
    fn truncated_stream_ends_gracefully() {
        let mut data = stream(2, 2, 25.0, &[&[0, 1, 2, 3], &[4, 5, 6, 7]]);
        data.truncate(data.len() - 2);
        let mut source = RawSource::new(Cursor::new(data)).unwrap();

        assert!(source.read_frame().unwrap().is_some());
        assert!(source.read_frame().unwrap().is_none());
    }

    #[test]
    fn bad_magic_rejected() {
        let mut data = stream(2, 2, 25.0, &[]);
        data[0] = b'X';
        assert!(RawSource::new(Cursor::new(data)).is_err());
    }
}
