use gvd_topo::{Cell, OccupancyGrid};

pub const CORRIDOR_RESOLUTION: f64 = 0.05;

/// 200x100 corridor: walls on the full top and bottom rows and a wall stub
/// at column 100 spanning rows 20..=79, leaving a gap above and below it.
pub fn corridor() -> OccupancyGrid {
    let (width, height) = (200, 100);
    let mut grid = OccupancyGrid::new(width, height, CORRIDOR_RESOLUTION);
    grid.fill(Cell::Free);
    for x in 0..width {
        grid.set(x, 0, Cell::Occupied);
        grid.set(x, height - 1, Cell::Occupied);
    }
    for y in 20..80 {
        grid.set(100, y, Cell::Occupied);
    }
    grid
}

/// ROS-style occupancy values for [`corridor`]: `100` walls, `0` free.
pub fn corridor_values() -> Vec<i8> {
    corridor()
        .cells
        .iter()
        .map(|c| if c.is_occupied() { 100 } else { 0 })
        .collect()
}

/// One-pixel skeleton mask with a horizontal run of `n` pixels on row 3.
pub fn straight_run(n: usize) -> (Vec<u8>, usize, usize) {
    let (width, height) = (n + 4, 7);
    let mut mask = vec![0u8; width * height];
    for x in 2..2 + n {
        mask[3 * width + x] = 255;
    }
    (mask, width, height)
}
