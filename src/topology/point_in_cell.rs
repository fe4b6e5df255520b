//! Point-in-reference-cell predicate.
//!
//! Maps a physical point to reference coordinates (closed-form for the
//! simplices, Newton iteration on the multilinear map for tensor-product
//! cells) and tests the reference-cell bounds. The tolerance is applied in
//! reference coordinates and is absolute, so a point within `tol` of a face
//! counts as inside.

use crate::topology::cell_type::CellTopology;

const NEWTON_ITERS: usize = 30;
const NEWTON_EPS: f64 = 1e-12;

/// Does `point` lie inside the element with the given vertex coordinates?
///
/// `verts` holds one `[x, y, z]` triple per canonical vertex (unused
/// components zero); `dim` is the spatial dimension and must equal the
/// topology dimension. Non-invertible or non-convergent coordinate maps
/// report "outside".
pub fn point_in_cell(
    topology: CellTopology,
    verts: &[[f64; 3]],
    dim: usize,
    point: &[f64],
    tol: f64,
) -> bool {
    debug_assert_eq!(verts.len(), topology.num_vertices());
    debug_assert_eq!(topology.dimension(), dim);
    match topology {
        CellTopology::Line => in_line(verts, point, tol),
        CellTopology::Triangle => in_triangle(verts, point, tol),
        CellTopology::Tetrahedron => in_tetrahedron(verts, point, tol),
        CellTopology::Quadrilateral => in_quadrilateral(verts, point, tol),
        CellTopology::Hexahedron => in_hexahedron(verts, point, tol),
        CellTopology::Wedge => in_wedge(verts, point, tol),
        CellTopology::Pyramid => in_pyramid(verts, point, tol),
    }
}

fn in_line(verts: &[[f64; 3]], point: &[f64], tol: f64) -> bool {
    let len = verts[1][0] - verts[0][0];
    if len.abs() < f64::MIN_POSITIVE {
        return (point[0] - verts[0][0]).abs() <= tol;
    }
    // Reference segment [-1, 1].
    let xi = 2.0 * (point[0] - verts[0][0]) / len - 1.0;
    xi.abs() <= 1.0 + tol
}

fn in_triangle(verts: &[[f64; 3]], point: &[f64], tol: f64) -> bool {
    let col0 = [verts[1][0] - verts[0][0], verts[1][1] - verts[0][1]];
    let col1 = [verts[2][0] - verts[0][0], verts[2][1] - verts[0][1]];
    let rhs = [point[0] - verts[0][0], point[1] - verts[0][1]];
    match solve2(col0, col1, rhs) {
        Some([a, b]) => a >= -tol && b >= -tol && a + b <= 1.0 + tol,
        None => false,
    }
}

fn in_tetrahedron(verts: &[[f64; 3]], point: &[f64], tol: f64) -> bool {
    let mut cols = [[0.0; 3]; 3];
    let mut rhs = [0.0; 3];
    for d in 0..3 {
        cols[0][d] = verts[1][d] - verts[0][d];
        cols[1][d] = verts[2][d] - verts[0][d];
        cols[2][d] = verts[3][d] - verts[0][d];
        rhs[d] = point[d] - verts[0][d];
    }
    match solve3(cols, rhs) {
        Some([a, b, c]) => a >= -tol && b >= -tol && c >= -tol && a + b + c <= 1.0 + tol,
        None => false,
    }
}

fn in_quadrilateral(verts: &[[f64; 3]], point: &[f64], tol: f64) -> bool {
    match newton(verts, point, 2, quad_shape) {
        Some(xi) => xi[0].abs() <= 1.0 + tol && xi[1].abs() <= 1.0 + tol,
        None => false,
    }
}

fn in_hexahedron(verts: &[[f64; 3]], point: &[f64], tol: f64) -> bool {
    match newton(verts, point, 3, hex_shape) {
        Some(xi) => xi.iter().all(|c| c.abs() <= 1.0 + tol),
        None => false,
    }
}

fn in_wedge(verts: &[[f64; 3]], point: &[f64], tol: f64) -> bool {
    match newton(verts, point, 3, wedge_shape) {
        Some([a, b, z]) => a >= -tol && b >= -tol && a + b <= 1.0 + tol && z.abs() <= 1.0 + tol,
        None => false,
    }
}

// The rational pyramid map is singular at the apex; splitting the pyramid
// into two tetrahedra along the base diagonal gives an exact containment
// test for a planar base.
fn in_pyramid(verts: &[[f64; 3]], point: &[f64], tol: f64) -> bool {
    let tet_a = [verts[0], verts[1], verts[2], verts[4]];
    let tet_b = [verts[0], verts[2], verts[3], verts[4]];
    in_tetrahedron(&tet_a, point, tol) || in_tetrahedron(&tet_b, point, tol)
}

type ShapeFn = fn([f64; 3]) -> ([f64; 8], [[f64; 3]; 8], usize);

fn quad_shape(xi: [f64; 3]) -> ([f64; 8], [[f64; 3]; 8], usize) {
    let [x, y, _] = xi;
    let mut n = [0.0; 8];
    let mut g = [[0.0; 3]; 8];
    // Counter-clockwise corners of [-1, 1]^2.
    let signs = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];
    for (i, (sx, sy)) in signs.into_iter().enumerate() {
        n[i] = 0.25 * (1.0 + sx * x) * (1.0 + sy * y);
        g[i][0] = 0.25 * sx * (1.0 + sy * y);
        g[i][1] = 0.25 * sy * (1.0 + sx * x);
    }
    (n, g, 4)
}

fn hex_shape(xi: [f64; 3]) -> ([f64; 8], [[f64; 3]; 8], usize) {
    let [x, y, z] = xi;
    let mut n = [0.0; 8];
    let mut g = [[0.0; 3]; 8];
    let signs = [
        (-1.0, -1.0, -1.0),
        (1.0, -1.0, -1.0),
        (1.0, 1.0, -1.0),
        (-1.0, 1.0, -1.0),
        (-1.0, -1.0, 1.0),
        (1.0, -1.0, 1.0),
        (1.0, 1.0, 1.0),
        (-1.0, 1.0, 1.0),
    ];
    for (i, (sx, sy, sz)) in signs.into_iter().enumerate() {
        n[i] = 0.125 * (1.0 + sx * x) * (1.0 + sy * y) * (1.0 + sz * z);
        g[i][0] = 0.125 * sx * (1.0 + sy * y) * (1.0 + sz * z);
        g[i][1] = 0.125 * sy * (1.0 + sx * x) * (1.0 + sz * z);
        g[i][2] = 0.125 * sz * (1.0 + sx * x) * (1.0 + sy * y);
    }
    (n, g, 8)
}

fn wedge_shape(xi: [f64; 3]) -> ([f64; 8], [[f64; 3]; 8], usize) {
    let [a, b, z] = xi;
    let tri = [1.0 - a - b, a, b];
    let tri_da = [-1.0, 1.0, 0.0];
    let tri_db = [-1.0, 0.0, 1.0];
    let mut n = [0.0; 8];
    let mut g = [[0.0; 3]; 8];
    for i in 0..3 {
        // Bottom triangle at z = -1, top at z = +1.
        n[i] = 0.5 * tri[i] * (1.0 - z);
        g[i][0] = 0.5 * tri_da[i] * (1.0 - z);
        g[i][1] = 0.5 * tri_db[i] * (1.0 - z);
        g[i][2] = -0.5 * tri[i];
        n[i + 3] = 0.5 * tri[i] * (1.0 + z);
        g[i + 3][0] = 0.5 * tri_da[i] * (1.0 + z);
        g[i + 3][1] = 0.5 * tri_db[i] * (1.0 + z);
        g[i + 3][2] = 0.5 * tri[i];
    }
    (n, g, 6)
}

fn newton(verts: &[[f64; 3]], point: &[f64], dim: usize, shape: ShapeFn) -> Option<[f64; 3]> {
    let mut xi = [0.0; 3];
    let scale = 1.0 + point.iter().map(|x| x.abs()).fold(0.0, f64::max);
    for _ in 0..NEWTON_ITERS {
        let (n, grads, nv) = shape(xi);
        let mut residual = [0.0; 3];
        for d in 0..dim {
            residual[d] = -point[d];
            for i in 0..nv {
                residual[d] += n[i] * verts[i][d];
            }
        }
        let norm = residual[..dim].iter().map(|r| r.abs()).fold(0.0, f64::max);
        if norm <= NEWTON_EPS * scale {
            return Some(xi);
        }
        // Jacobian column c = d(map)/d(xi_c).
        if dim == 2 {
            let mut j = [[0.0; 2]; 2];
            for d in 0..2 {
                for c in 0..2 {
                    for i in 0..nv {
                        j[d][c] += grads[i][c] * verts[i][d];
                    }
                }
            }
            let delta = solve2([j[0][0], j[1][0]], [j[0][1], j[1][1]], [residual[0], residual[1]])?;
            xi[0] -= delta[0];
            xi[1] -= delta[1];
        } else {
            let mut j = [[0.0; 3]; 3];
            for d in 0..3 {
                for c in 0..3 {
                    for i in 0..nv {
                        j[d][c] += grads[i][c] * verts[i][d];
                    }
                }
            }
            let cols = [
                [j[0][0], j[1][0], j[2][0]],
                [j[0][1], j[1][1], j[2][1]],
                [j[0][2], j[1][2], j[2][2]],
            ];
            let delta = solve3(cols, residual)?;
            for c in 0..3 {
                xi[c] -= delta[c];
            }
        }
        if xi.iter().any(|c| !c.is_finite() || c.abs() > 1e6) {
            return None;
        }
    }
    None
}

/// Solve `[col0 col1] x = rhs`.
fn solve2(col0: [f64; 2], col1: [f64; 2], rhs: [f64; 2]) -> Option<[f64; 2]> {
    let det = col0[0] * col1[1] - col1[0] * col0[1];
    if det.abs() < 1e-300 {
        return None;
    }
    Some([
        (rhs[0] * col1[1] - col1[0] * rhs[1]) / det,
        (col0[0] * rhs[1] - rhs[0] * col0[1]) / det,
    ])
}

/// Solve `[col0 col1 col2] x = rhs` by Cramer's rule.
fn solve3(cols: [[f64; 3]; 3], rhs: [f64; 3]) -> Option<[f64; 3]> {
    let det = det3(cols[0], cols[1], cols[2]);
    if det.abs() < 1e-300 {
        return None;
    }
    Some([
        det3(rhs, cols[1], cols[2]) / det,
        det3(cols[0], rhs, cols[2]) / det,
        det3(cols[0], cols[1], rhs) / det,
    ])
}

fn det3(a: [f64; 3], b: [f64; 3], c: [f64; 3]) -> f64 {
    a[0] * (b[1] * c[2] - b[2] * c[1]) - b[0] * (a[1] * c[2] - a[2] * c[1])
        + c[0] * (a[1] * b[2] - a[2] * b[1])
}
