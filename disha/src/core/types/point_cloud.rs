//! Point cloud map container.

use serde::{Deserialize, Serialize};

use super::Header;

/// Datatype codes for [`PointField`], matching sensor_msgs/PointField.
pub mod datatype {
    pub const INT8: u8 = 1;
    pub const UINT8: u8 = 2;
    pub const INT16: u8 = 3;
    pub const UINT16: u8 = 4;
    pub const INT32: u8 = 5;
    pub const UINT32: u8 = 6;
    pub const FLOAT32: u8 = 7;
    pub const FLOAT64: u8 = 8;
}

/// Layout of one named field inside a point record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointField {
    pub name: String,
    /// Byte offset from the start of the point record.
    pub offset: u32,
    /// One of the [`datatype`] codes.
    pub datatype: u8,
    /// Number of elements in this field.
    pub count: u32,
}

/// Generic packed point cloud, laid out like sensor_msgs/PointCloud2.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PointCloud2 {
    pub header: Header,
    pub height: u32,
    pub width: u32,
    pub fields: Vec<PointField>,
    pub is_bigendian: bool,
    /// Bytes per point.
    pub point_step: u32,
    /// Bytes per row.
    pub row_step: u32,
    pub data: Vec<u8>,
    /// True if there are no invalid points.
    pub is_dense: bool,
}

impl PointCloud2 {
    /// Unorganized little-endian XYZ float32 cloud.
    pub fn from_xyz(header: Header, points: &[[f32; 3]]) -> Self {
        let fields = ["x", "y", "z"]
            .iter()
            .enumerate()
            .map(|(i, name)| PointField {
                name: (*name).to_string(),
                offset: (i * 4) as u32,
                datatype: datatype::FLOAT32,
                count: 1,
            })
            .collect();

        let mut data = Vec::with_capacity(points.len() * 12);
        for p in points {
            for v in p {
                data.extend_from_slice(&v.to_le_bytes());
            }
        }

        Self {
            header,
            height: 1,
            width: points.len() as u32,
            fields,
            is_bigendian: false,
            point_step: 12,
            row_step: 12 * points.len() as u32,
            data,
            is_dense: true,
        }
    }

    /// Number of points in the cloud.
    pub fn len(&self) -> usize {
        self.height as usize * self.width as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_xyz_layout() {
        let cloud = PointCloud2::from_xyz(
            Header::new(1, "map"),
            &[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]],
        );
        assert_eq!(cloud.len(), 2);
        assert_eq!(cloud.data.len(), 24);
        assert_eq!(cloud.row_step, 24);
        assert_eq!(cloud.fields[2].name, "z");
        assert_eq!(cloud.fields[2].offset, 8);
        let y = f32::from_le_bytes(cloud.data[4..8].try_into().unwrap());
        assert_eq!(y, 2.0);
    }

    #[test]
    fn test_empty_cloud() {
        let cloud = PointCloud2::from_xyz(Header::default(), &[]);
        assert!(cloud.is_empty());
    }
}
