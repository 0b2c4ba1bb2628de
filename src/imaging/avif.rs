//! AVIF decoding via `avif-parse` (container) + `rav1d` (AV1 bitstream).
//!
//! The `image` crate's `"avif"` feature only provides the encoder (rav1e).
//! Its decoder needs `"avif-native"`, which links the C library dav1d. `rav1d`
//! is a pure Rust port of dav1d, driven here through its C-compatible API.

use super::backend::CodecError;
use image::{DynamicImage, Rgb, RgbImage};

/// Decode an in-memory AVIF file into an RGB8 image.
pub(crate) fn decode_avif(bytes: &[u8]) -> Result<DynamicImage, CodecError> {
    let avif = parse_container(bytes)?;
    decode_av1(&avif.primary_item)
}

fn parse_container(bytes: &[u8]) -> Result<avif_parse::AvifData, CodecError> {
    avif_parse::read_avif(&mut std::io::Cursor::new(bytes))
        .map_err(|e| CodecError::Decode(format!("invalid AVIF container: {e:?}")))
}

fn decode_av1(av1_bytes: &[u8]) -> Result<DynamicImage, CodecError> {
    use rav1d::include::dav1d::data::Dav1dData;
    use rav1d::include::dav1d::dav1d::Dav1dSettings;
    use rav1d::include::dav1d::headers::{
        DAV1D_PIXEL_LAYOUT_I400, DAV1D_PIXEL_LAYOUT_I420, DAV1D_PIXEL_LAYOUT_I422,
        DAV1D_PIXEL_LAYOUT_I444,
    };
    use rav1d::include::dav1d::picture::Dav1dPicture;
    use rav1d::src::lib as dav1d;
    use std::ptr::NonNull;

    let mut settings = std::mem::MaybeUninit::<Dav1dSettings>::uninit();
    let settings_ptr = NonNull::new(settings.as_mut_ptr())
        .ok_or_else(|| CodecError::Decode("rav1d settings allocation failed".into()))?;
    unsafe { dav1d::dav1d_default_settings(settings_ptr) };
    let mut settings = unsafe { settings.assume_init() };
    // Still images: one frame, no frame threading.
    settings.n_threads = 1;
    settings.max_frame_delay = 1;

    let mut ctx = None;
    let rc = unsafe { dav1d::dav1d_open(NonNull::new(&mut ctx), NonNull::new(&mut settings)) };
    if rc.0 != 0 {
        return Err(CodecError::Decode(format!("rav1d open failed ({})", rc.0)));
    }

    let mut data = Dav1dData::default();
    let buf = unsafe { dav1d::dav1d_data_create(NonNull::new(&mut data), av1_bytes.len()) };
    if buf.is_null() {
        unsafe { dav1d::dav1d_close(NonNull::new(&mut ctx)) };
        return Err(CodecError::Decode("rav1d data_create failed".into()));
    }
    unsafe { std::ptr::copy_nonoverlapping(av1_bytes.as_ptr(), buf, av1_bytes.len()) };

    let rc = unsafe { dav1d::dav1d_send_data(ctx, NonNull::new(&mut data)) };
    if rc.0 != 0 {
        unsafe {
            dav1d::dav1d_data_unref(NonNull::new(&mut data));
            dav1d::dav1d_close(NonNull::new(&mut ctx));
        }
        return Err(CodecError::Decode(format!(
            "rav1d send_data failed ({})",
            rc.0
        )));
    }

    let mut pic: Dav1dPicture = unsafe { std::mem::zeroed() };
    let rc = unsafe { dav1d::dav1d_get_picture(ctx, NonNull::new(&mut pic)) };
    if rc.0 != 0 {
        unsafe { dav1d::dav1d_close(NonNull::new(&mut ctx)) };
        return Err(CodecError::Decode(format!(
            "rav1d get_picture failed ({})",
            rc.0
        )));
    }

    let subsampling = match pic.p.layout {
        DAV1D_PIXEL_LAYOUT_I400 => Some(None),
        DAV1D_PIXEL_LAYOUT_I420 => Some(Some((true, true))),
        DAV1D_PIXEL_LAYOUT_I422 => Some(Some((true, false))),
        DAV1D_PIXEL_LAYOUT_I444 => Some(Some((false, false))),
        _ => None,
    };

    let planes = match (subsampling, pic.data[0]) {
        (Some(chroma), Some(y)) => {
            let y_ptr = y.as_ptr() as *const u8;
            let chroma_planes = match (chroma, pic.data[1], pic.data[2]) {
                (None, _, _) => Some(Chroma::Monochrome),
                (Some((ss_x, ss_y)), Some(u), Some(v)) => Some(Chroma::Planes {
                    u_ptr: u.as_ptr() as *const u8,
                    v_ptr: v.as_ptr() as *const u8,
                    stride: pic.stride[1],
                    ss_x,
                    ss_y,
                }),
                _ => None,
            };
            chroma_planes.map(|chroma| YuvPlanes {
                y_ptr,
                y_stride: pic.stride[0],
                chroma,
                width: pic.p.w as u32,
                height: pic.p.h as u32,
                bpc: pic.p.bpc as u32,
            })
        }
        _ => None,
    };

    let rgb = planes.map(|p| p.to_rgb());
    let layout = pic.p.layout;

    unsafe {
        dav1d::dav1d_picture_unref(NonNull::new(&mut pic));
        dav1d::dav1d_close(NonNull::new(&mut ctx));
    }

    rgb.map(DynamicImage::ImageRgb8).ok_or_else(|| {
        CodecError::UnsupportedFormat(format!("avif: unsupported pixel layout {layout}"))
    })
}

enum Chroma {
    Monochrome,
    Planes {
        u_ptr: *const u8,
        v_ptr: *const u8,
        stride: isize,
        /// Horizontal / vertical subsampling (I420 = both).
        ss_x: bool,
        ss_y: bool,
    },
}

/// Borrowed YUV planes of a decoded rav1d picture.
///
/// Only valid until the picture is unreferenced.
struct YuvPlanes {
    y_ptr: *const u8,
    y_stride: isize,
    chroma: Chroma,
    width: u32,
    height: u32,
    bpc: u32,
}

impl YuvPlanes {
    /// Convert to RGB8 using BT.601 coefficients.
    fn to_rgb(&self) -> RgbImage {
        let max_val = ((1u32 << self.bpc) - 1) as f32;
        let center = (1u32 << (self.bpc - 1)) as f32;
        let scale = 255.0 / max_val;
        let to_u8 = |v: f32| (v * scale).clamp(0.0, 255.0) as u8;

        RgbImage::from_fn(self.width, self.height, |col, row| {
            let luma = read_sample(self.y_ptr, self.y_stride, col, row, self.bpc);
            match self.chroma {
                Chroma::Monochrome => {
                    let v = to_u8(luma);
                    Rgb([v, v, v])
                }
                Chroma::Planes {
                    u_ptr,
                    v_ptr,
                    stride,
                    ss_x,
                    ss_y,
                } => {
                    let cx = if ss_x { col / 2 } else { col };
                    let cy = if ss_y { row / 2 } else { row };
                    let cb = read_sample(u_ptr, stride, cx, cy, self.bpc) - center;
                    let cr = read_sample(v_ptr, stride, cx, cy, self.bpc) - center;
                    Rgb([
                        to_u8(luma + 1.402 * cr),
                        to_u8(luma - 0.344136 * cb - 0.714136 * cr),
                        to_u8(luma + 1.772 * cb),
                    ])
                }
            }
        })
    }
}

/// Read one sample; 8-bit planes store bytes, 10/12-bit planes store u16.
#[inline]
fn read_sample(ptr: *const u8, stride: isize, x: u32, y: u32, bpc: u32) -> f32 {
    let row = y as isize * stride;
    if bpc <= 8 {
        (unsafe { *ptr.offset(row + x as isize) }) as f32
    } else {
        (unsafe { *(ptr.offset(row + x as isize * 2) as *const u16) }) as f32
    }
}
