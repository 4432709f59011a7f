//! Bit packing and spatial mixing of difference images.

/// Packs the least significant bit of every usable difference value into
/// bytes, first value in the lowest bit. Trailing bits that do not fill a
/// whole byte are dropped.
///
/// `usable` reports whether the pixel at an index carries noise; saturated
/// pixels are clipped and their differences carry none.
pub fn pack_lsb(diffs: &[u8], usable: impl Fn(usize) -> bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(diffs.len() / 8);
    let mut acc = 0u8;
    let mut filled = 0u32;

    for (i, &d) in diffs.iter().enumerate() {
        if !usable(i) {
            continue;
        }
        acc |= (d & 1) << filled;
        filled += 1;
        if filled == 8 {
            out.push(acc);
            acc = 0;
            filled = 0;
        }
    }
    out
}

/// XORs each byte with the byte `stride` positions later, wrapping around.
///
/// Adjacent pixels share optics and readout circuitry, so neighbouring
/// packed bytes are mixed with distant ones.
pub fn mix(data: &[u8], stride: usize) -> Vec<u8> {
    if data.len() < 2 {
        return data.to_vec();
    }
    let len = data.len();
    let stride = (stride % len).max(1);

    data.iter()
        .enumerate()
        .map(|(i, &byte)| byte ^ data[(i + stride) % len])
        .collect()
}
