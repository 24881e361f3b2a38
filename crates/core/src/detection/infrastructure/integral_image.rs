use image::GrayImage;
use ndarray::Array2;

/// Summed-area tables over one pyramid level.
///
/// `sum` and `sq_sum` have shape `(h + 1, w + 1)` with a zero first row and
/// column, so the sum over `[x, x + w) x [y, y + h)` needs four lookups.
/// `tilted` holds 45-degree rotated sums and is only built when a cascade
/// uses tilted features.
pub(crate) struct IntegralImage {
    sum: Array2<f64>,
    sq_sum: Array2<f64>,
    tilted: Option<TiltedSum>,
}

struct TiltedSum {
    table: Array2<f64>,
    pad: usize,
}

impl IntegralImage {
    pub(crate) fn new(img: &GrayImage, with_tilted: bool) -> Self {
        let (w, h) = (img.width() as usize, img.height() as usize);
        let mut sum = Array2::<f64>::zeros((h + 1, w + 1));
        let mut sq_sum = Array2::<f64>::zeros((h + 1, w + 1));

        for y in 0..h {
            let mut row = 0.0;
            let mut sq_row = 0.0;
            for x in 0..w {
                let v = img.get_pixel(x as u32, y as u32)[0] as f64;
                row += v;
                sq_row += v * v;
                sum[[y + 1, x + 1]] = sum[[y, x + 1]] + row;
                sq_sum[[y + 1, x + 1]] = sq_sum[[y, x + 1]] + sq_row;
            }
        }

        let tilted = with_tilted.then(|| TiltedSum::new(img));
        Self {
            sum,
            sq_sum,
            tilted,
        }
    }

    pub(crate) fn rect_sum(&self, x: usize, y: usize, w: usize, h: usize) -> f64 {
        Self::lookup(&self.sum, x, y, w, h)
    }

    pub(crate) fn rect_sq_sum(&self, x: usize, y: usize, w: usize, h: usize) -> f64 {
        Self::lookup(&self.sq_sum, x, y, w, h)
    }

    /// Sum over the 45-degree rectangle whose top corner is `(x, y)`, running
    /// `w` pixels down-right and `h` pixels down-left. Zero when tilted sums
    /// were not built.
    pub(crate) fn tilted_sum(&self, x: i64, y: i64, w: i64, h: i64) -> f64 {
        match &self.tilted {
            Some(t) => {
                t.at(x, y) - t.at(x - h, y + h) - t.at(x + w, y + w) + t.at(x + w - h, y + w + h)
            }
            None => 0.0,
        }
    }

    fn lookup(table: &Array2<f64>, x: usize, y: usize, w: usize, h: usize) -> f64 {
        table[[y + h, x + w]] - table[[y, x + w]] - table[[y + h, x]] + table[[y, x]]
    }
}

impl TiltedSum {
    /// Builds `R(x, y)`: the sum of pixels in the upward-opening triangle
    /// whose apex is pixel `(x - 1, y - 1)`.
    fn new(img: &GrayImage) -> Self {
        let (w, h) = (img.width() as i64, img.height() as i64);
        let pad = (h + 1) as usize;
        let cols = w as usize + 1 + 2 * pad;
        let mut table = Array2::<f64>::zeros((h as usize + 1, cols));

        let pixel = |x: i64, y: i64| -> f64 {
            if x < 0 || y < 0 || x >= w || y >= h {
                0.0
            } else {
                img.get_pixel(x as u32, y as u32)[0] as f64
            }
        };

        // Columns outside the image still accumulate from their neighbours,
        // so iterate over the padded range.
        for ty in 1..=h {
            for tx in -(pad as i64)..(w + 1 + pad as i64) {
                let get = |t: &Array2<f64>, x: i64, y: i64| -> f64 {
                    let col = x + pad as i64;
                    if y < 0 || col < 0 || col as usize >= cols {
                        0.0
                    } else {
                        t[[y as usize, col as usize]]
                    }
                };
                let value = get(&table, tx - 1, ty - 1) + get(&table, tx + 1, ty - 1)
                    - get(&table, tx, ty - 2)
                    + pixel(tx - 1, ty - 1)
                    + pixel(tx - 1, ty - 2);
                table[[ty as usize, (tx + pad as i64) as usize]] = value;
            }
        }
        Self { table, pad }
    }

    fn at(&self, x: i64, y: i64) -> f64 {
        let col = x + self.pad as i64;
        if y < 0 || col < 0 || y as usize >= self.table.nrows() || col as usize >= self.table.ncols() {
            return 0.0;
        }
        self.table[[y as usize, col as usize]]
    }
}
