use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use gbsig_core::render::{SCREEN_HEIGHT, SCREEN_WIDTH};

use crate::error::HostError;

fn frame_to_rgb(frame: &[u32]) -> Vec<u8> {
    let mut out = vec![0u8; frame.len() * 3];
    for (i, &px) in frame.iter().enumerate() {
        out[i * 3] = ((px >> 16) & 0xFF) as u8;
        out[i * 3 + 1] = ((px >> 8) & 0xFF) as u8;
        out[i * 3 + 2] = (px & 0xFF) as u8;
    }
    out
}

/// Writes a 160x144 `0x00RRGGBB` frame as an 8-bit RGB PNG.
pub fn write_png(path: &Path, frame: &[u32]) -> Result<(), HostError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| HostError::io(parent, e))?;
    }
    let file = File::create(path).map_err(|e| HostError::io(path, e))?;
    let w = BufWriter::new(file);
    let mut encoder = png::Encoder::new(w, SCREEN_WIDTH as u32, SCREEN_HEIGHT as u32);
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(&frame_to_rgb(frame))?;
    writer.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufReader;

    #[test]
    fn written_frame_decodes_to_same_pixels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("frame.png");
        let mut frame = vec![0x00FF_FF80u32; SCREEN_WIDTH * SCREEN_HEIGHT];
        frame[1] = 0x0012_3456;
        frame[SCREEN_WIDTH * SCREEN_HEIGHT - 1] = 0x0000_1800;
        write_png(&path, &frame).unwrap();

        let file = File::open(&path).unwrap();
        let decoder = png::Decoder::new(BufReader::new(file));
        let mut reader = decoder.read_info().unwrap();
        let mut buf = vec![0; reader.output_buffer_size().unwrap()];
        let info = reader.next_frame(&mut buf).unwrap();
        assert_eq!(info.width, SCREEN_WIDTH as u32);
        assert_eq!(info.height, SCREEN_HEIGHT as u32);
        assert_eq!(info.color_type, png::ColorType::Rgb);
        let data = &buf[..info.buffer_size()];
        assert_eq!(&data[..6], &[0xFF, 0xFF, 0x80, 0x12, 0x34, 0x56]);
        assert_eq!(&data[data.len() - 3..], &[0x00, 0x18, 0x00]);
    }

    #[test]
    fn unwritable_path_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let err = write_png(&blocker.join("frame.png"), &[0; SCREEN_WIDTH * SCREEN_HEIGHT]);
        assert!(matches!(err, Err(HostError::Io { .. })));
    }
}
