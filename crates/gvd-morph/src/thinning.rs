use gvd_core::{Image, ImageView};

// Clockwise from north: P2..P9 in Zhang-Suen notation.
const RING_DX: [isize; 8] = [0, 1, 1, 1, 0, -1, -1, -1];
const RING_DY: [isize; 8] = [-1, -1, 0, 1, 1, 1, 0, -1];

/// Zhang-Suen thinning run to convergence.
///
/// Reduces binary shapes to 8-connected curves one pixel wide while keeping
/// their topology. The outermost ring of the image is never modified. An
/// isolated 2x2 block is removed entirely, a known property of the method.
pub fn thin_zhang_suen_u8(src: &ImageView<'_, u8>) -> Image<u8> {
    let (w, h) = (src.width(), src.height());
    let mut bits = vec![0u8; w * h];
    for y in 0..h {
        for (x, &v) in src.row(y).iter().enumerate() {
            bits[y * w + x] = u8::from(v != 0);
        }
    }

    if w >= 3 && h >= 3 {
        let mut doomed = Vec::new();
        loop {
            let mut changed = false;
            for first_pass in [true, false] {
                doomed.clear();
                for y in 1..h - 1 {
                    for x in 1..w - 1 {
                        let p = y * w + x;
                        if bits[p] != 0 && removable(&bits, w, x, y, first_pass) {
                            doomed.push(p);
                        }
                    }
                }

                for &p in &doomed {
                    bits[p] = 0;
                }
                changed |= !doomed.is_empty();
            }

            if !changed {
                break;
            }
        }
    }

    let data = bits.into_iter().map(|b| b * 255).collect();
    Image::from_vec(w, h, data).unwrap_or_else(|_| Image::empty())
}

fn removable(bits: &[u8], w: usize, x: usize, y: usize, first_pass: bool) -> bool {
    let mut ring = [0u8; 8];
    for k in 0..8 {
        let nx = (x as isize + RING_DX[k]) as usize;
        let ny = (y as isize + RING_DY[k]) as usize;
        ring[k] = bits[ny * w + nx];
    }

    let neighbors: u8 = ring.iter().sum();
    if !(2..=6).contains(&neighbors) {
        return false;
    }

    let transitions = (0..8)
        .filter(|&k| ring[k] == 0 && ring[(k + 1) % 8] != 0)
        .count();
    if transitions != 1 {
        return false;
    }

    let [n, _, e, _, s, _, west, _] = ring;
    if first_pass {
        n * e * s == 0 && e * s * west == 0
    } else {
        n * e * west == 0 && n * s * west == 0
    }
}
