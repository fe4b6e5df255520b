//! Element topology metadata.

use crate::transfer_error::TransferError;

/// The closed set of element topologies a mesh block may carry.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CellTopology {
    /// 1D segment.
    Line,
    /// 2D simplex.
    Triangle,
    /// 2D tensor-product cell.
    Quadrilateral,
    /// 3D simplex.
    Tetrahedron,
    /// 3D quad-based pyramid.
    Pyramid,
    /// 3D wedge/prism.
    Wedge,
    /// 3D tensor-product cell.
    Hexahedron,
}

impl CellTopology {
    /// Topological dimension of the cell.
    pub fn dimension(self) -> usize {
        match self {
            CellTopology::Line => 1,
            CellTopology::Triangle | CellTopology::Quadrilateral => 2,
            CellTopology::Tetrahedron
            | CellTopology::Pyramid
            | CellTopology::Wedge
            | CellTopology::Hexahedron => 3,
        }
    }

    /// Vertices per element of this topology.
    pub fn num_vertices(self) -> usize {
        match self {
            CellTopology::Line => 2,
            CellTopology::Triangle => 3,
            CellTopology::Quadrilateral | CellTopology::Tetrahedron => 4,
            CellTopology::Pyramid => 5,
            CellTopology::Wedge => 6,
            CellTopology::Hexahedron => 8,
        }
    }

    /// Stable tag for block-metadata broadcasts.
    pub fn as_tag(self) -> u32 {
        match self {
            CellTopology::Line => 0,
            CellTopology::Triangle => 1,
            CellTopology::Quadrilateral => 2,
            CellTopology::Tetrahedron => 3,
            CellTopology::Pyramid => 4,
            CellTopology::Wedge => 5,
            CellTopology::Hexahedron => 6,
        }
    }

    pub fn from_tag(tag: u32) -> Result<Self, TransferError> {
        Ok(match tag {
            0 => CellTopology::Line,
            1 => CellTopology::Triangle,
            2 => CellTopology::Quadrilateral,
            3 => CellTopology::Tetrahedron,
            4 => CellTopology::Pyramid,
            5 => CellTopology::Wedge,
            6 => CellTopology::Hexahedron,
            other => return Err(TransferError::UnknownTopology(other)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_roundtrip() {
        for topo in [
            CellTopology::Line,
            CellTopology::Triangle,
            CellTopology::Quadrilateral,
            CellTopology::Tetrahedron,
            CellTopology::Pyramid,
            CellTopology::Wedge,
            CellTopology::Hexahedron,
        ] {
            assert_eq!(CellTopology::from_tag(topo.as_tag()).unwrap(), topo);
        }
        assert!(matches!(
            CellTopology::from_tag(7),
            Err(TransferError::UnknownTopology(7))
        ));
    }
}
