/// Check if there are at least `min_count` consecutive true values in the circular array
/// using a branch-free bitmask approach
pub fn has_consecutive_pixels(pixels: &[bool; 16], min_count: usize) -> bool {
    if min_count > 16 || min_count == 0 {
        return false;
    }

    let mask = pixels
        .iter()
        .enumerate()
        .fold(0u16, |m, (i, &p)| if p { m | (1 << i) } else { m });

    // A run of length n survives n-1 rotated ANDs
    let mut test_mask = mask;
    for i in 1..min_count {
        test_mask &= mask.rotate_left(i as u32);
        if test_mask == 0 {
            return false;
        }
    }
    test_mask != 0
}
