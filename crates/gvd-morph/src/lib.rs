//! Binary morphology helpers.
//!
//! Pixels are treated as binary with threshold `> 0`.
//! Outputs are `0` or `255` in `u8`.
//!
//! Structuring elements are squares of side `2 * radius + 1`. Neighbors that
//! fall outside the image count as unset, so erosion eats into shapes touching
//! the border.

use gvd_core::{Image, ImageView};

mod thinning;

pub use thinning::thin_zhang_suen_u8;

pub fn erode_binary_u8(src: &ImageView<'_, u8>, radius: usize) -> Image<u8> {
    let (w, h) = (src.width(), src.height());
    let mut out = Image::new_fill(w, h, 0u8);
    if w == 0 || h == 0 {
        return out;
    }

    let r = radius as isize;
    let data = out.data_mut();
    for y in 0..h {
        for x in 0..w {
            let mut all_set = true;
            'window: for dy in -r..=r {
                let ny = y as isize + dy;
                if ny < 0 || ny >= h as isize {
                    all_set = false;
                    break;
                }

                let row = src.row(ny as usize);
                for dx in -r..=r {
                    let nx = x as isize + dx;
                    if nx < 0 || nx >= w as isize || row[nx as usize] == 0 {
                        all_set = false;
                        break 'window;
                    }
                }
            }

            data[y * w + x] = if all_set { 255 } else { 0 };
        }
    }

    out
}

pub fn dilate_binary_u8(src: &ImageView<'_, u8>, radius: usize) -> Image<u8> {
    let (w, h) = (src.width(), src.height());
    let mut out = Image::new_fill(w, h, 0u8);
    if w == 0 || h == 0 {
        return out;
    }

    let r = radius as isize;
    let data = out.data_mut();
    for y in 0..h {
        for x in 0..w {
            let mut any_set = false;
            'window: for dy in -r..=r {
                let ny = y as isize + dy;
                if ny < 0 || ny >= h as isize {
                    continue;
                }

                let row = src.row(ny as usize);
                for dx in -r..=r {
                    let nx = x as isize + dx;
                    if nx < 0 || nx >= w as isize {
                        continue;
                    }
                    if row[nx as usize] != 0 {
                        any_set = true;
                        break 'window;
                    }
                }
            }

            data[y * w + x] = if any_set { 255 } else { 0 };
        }
    }

    out
}

/// Erode then dilate: removes set specks smaller than the structuring element.
pub fn open_binary_u8(src: &ImageView<'_, u8>, radius: usize) -> Image<u8> {
    let eroded = erode_binary_u8(src, radius);
    dilate_binary_u8(&eroded.as_view(), radius)
}
