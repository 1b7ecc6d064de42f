//! VP8 dequantization factors for the hardware IQ matrix
//!
//! The client supplies quantizer indices per segment; the hardware wants the
//! resolved step sizes, with the Y2 and chroma adjustments from the VP8
//! bitstream guide already applied.

/// DC quantizer lookup table (qi 0-127)
pub const DC_QUANT: [i16; 128] = [
    4, 5, 6, 7, 8, 9, 10, 10, 11, 12, 13, 14, 15, 16, 17, 17, 18, 19, 20, 20, 21, 21, 22, 22, 23,
    23, 24, 25, 25, 26, 27, 28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 37, 38, 39, 40, 41, 42, 43, 44,
    45, 46, 46, 47, 48, 49, 50, 51, 52, 53, 54, 55, 56, 57, 58, 59, 60, 61, 62, 63, 64, 65, 66, 67,
    68, 69, 70, 71, 72, 73, 74, 75, 76, 76, 77, 78, 79, 80, 81, 82, 83, 84, 85, 86, 87, 88, 89, 91,
    93, 95, 96, 98, 100, 101, 102, 104, 106, 108, 110, 112, 114, 116, 118, 122, 124, 126, 128, 130,
    132, 134, 136, 138, 140, 143, 145, 148, 151, 154, 157,
];

/// AC quantizer lookup table (qi 0-127)
pub const AC_QUANT: [i16; 128] = [
    4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28,
    29, 30, 31, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47, 48, 49, 50, 51, 52,
    53, 54, 55, 56, 57, 58, 60, 62, 64, 66, 68, 70, 72, 74, 76, 78, 80, 82, 84, 86, 88, 90, 92, 94,
    96, 98, 100, 102, 104, 106, 108, 110, 112, 114, 116, 119, 122, 125, 128, 131, 134, 137, 140,
    143, 146, 149, 152, 155, 158, 161, 164, 167, 170, 173, 177, 181, 185, 189, 193, 197, 201, 205,
    209, 213, 217, 221, 225, 229, 234, 239, 245, 249, 254, 259, 264, 269, 274, 279, 284,
];

/// Largest valid quantizer index
pub const MAX_QINDEX: i32 = 127;

/// Clamp a quantizer index into the table range
#[inline]
pub fn clamp_qindex(index: i32) -> usize {
    index.clamp(0, MAX_QINDEX) as usize
}

/// DC step size for an index
#[inline]
pub fn dc_quant(index: i32) -> u16 {
    DC_QUANT[clamp_qindex(index)] as u16
}

/// AC step size for an index
#[inline]
pub fn ac_quant(index: i32) -> u16 {
    AC_QUANT[clamp_qindex(index)] as u16
}

/// Widen a client quantizer index
///
/// Client indices travel as `u16`, but the hardware contract treats them as
/// signed 16-bit values, so anything above `i16::MAX` clamps to zero.
#[inline]
fn signed_index(index: u16) -> i32 {
    i32::from(index as i16)
}

/// Dequantization factors for one segment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentDequant {
    pub y1_dc: u16,
    pub y1_ac: u16,
    pub uv_dc: u16,
    pub uv_ac: u16,
    pub y2_dc: u16,
    pub y2_ac: u16,
}

impl SegmentDequant {
    /// Resolve factors from a segment's client indices
    ///
    /// Index order is `[y_ac, y_dc, y2_dc, y2_ac, uv_dc, uv_ac]`.
    pub fn from_indices(indices: &[u16; 6]) -> Self {
        let qi = |i: usize| signed_index(indices[i]);

        SegmentDequant {
            y1_dc: dc_quant(qi(1)),
            y1_ac: ac_quant(qi(0)),
            uv_dc: dc_quant(qi(4)).min(132),
            uv_ac: ac_quant(qi(5)),
            y2_dc: 2 * dc_quant(qi(2)),
            y2_ac: ((155 * u32::from(ac_quant(qi(3)))) / 100).max(8) as u16,
        }
    }

    /// Factors in hardware order
    pub fn to_array(&self) -> [u16; 6] {
        [
            self.y1_dc,
            self.y1_ac,
            self.uv_dc,
            self.uv_ac,
            self.y2_dc,
            self.y2_ac,
        ]
    }
}
