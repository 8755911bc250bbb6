// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! SA-IS: Suffix Array by Induced Sorting
//!
//! Linear-time O(n) suffix array construction over the sentinel-terminated
//! input. The caller guarantees the final byte is strictly smaller than every
//! other byte in the text (construction appends `0x01` and rejects inputs
//! containing `0x00`/`0x01`), which makes suffix order equal rotation order —
//! the property the next-pointer encoding depends on.
//!
//! ```text
//! Input: "banana" + sentinel
//!
//! Step 1: Classify suffixes
//! ┌───┬───┬───┬───┬───┬───┬───┐
//! │ b │ a │ n │ a │ n │ a │ $ │
//! ├───┼───┼───┼───┼───┼───┼───┤
//! │ L │ S │ L │ S │ L │ L │ S │   (S = smaller than next, L = larger)
//! └───┴───┴───┴───┴───┴───┴───┘
//!
//! Step 2: Find LMS (Leftmost S-type) suffixes: S-type preceded by L-type
//! Step 3: Induced sorting — place LMS at bucket tails, induce L left-to-
//!         right, induce S right-to-left
//! Step 4: If LMS substrings are not unique, recurse on the reduced problem
//! Step 5: Use the sorted LMS order to induce the final suffix array
//! ```
//!
//! # References
//!
//! - Nong, Zhang, Chan (2009): "Linear Suffix Array Construction by Almost
//!   Pure Induced-Sorting" <https://doi.org/10.1109/DCC.2009.42>

/// Suffix type classification.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum SuffixType {
    /// Suffix is lexicographically smaller than the one after it
    S,
    /// Suffix is lexicographically larger than the one after it
    L,
}

/// Build the suffix array of `text` (all positions, including the sentinel).
///
/// `sa[i]` is the starting position of the i-th smallest suffix. The last
/// byte of `text` must be strictly smaller than every other byte.
pub fn suffix_array(text: &[u8]) -> Vec<u64> {
    if text.is_empty() {
        return Vec::new();
    }
    debug_assert!(text[..text.len() - 1]
        .iter()
        .all(|&b| b > text[text.len() - 1]));
    sais_u8(text).into_iter().map(|p| p as u64).collect()
}

/// Core SA-IS for the byte alphabet.
fn sais_u8(text: &[u8]) -> Vec<usize> {
    let n = text.len();
    if n == 1 {
        return vec![0];
    }

    let types = classify_u8(text);
    let lms_positions: Vec<usize> = (1..n).filter(|&i| is_lms(&types, i)).collect();
    let bucket_sizes = bucket_sizes_u8(text);

    // First induced sort to determine LMS order.
    let mut sa = vec![usize::MAX; n];
    let mut tails = bucket_tails(&bucket_sizes);
    for &pos in lms_positions.iter().rev() {
        let c = text[pos] as usize;
        tails[c] -= 1;
        sa[tails[c]] = pos;
    }
    induce(&mut sa, &types, &bucket_sizes, |j| text[j] as usize);

    // Name LMS substrings.
    let mut name = 0usize;
    let mut prev_pos: Option<usize> = None;
    let mut lms_names = vec![0usize; n];
    for &pos in sa.iter() {
        if !is_lms(&types, pos) {
            continue;
        }
        if let Some(prev) = prev_pos {
            if !lms_equal(text, &types, prev, pos) {
                name += 1;
            }
        }
        lms_names[pos] = name;
        prev_pos = Some(pos);
    }
    let unique_count = name + 1;

    // Reduced string in text order.
    let reduced: Vec<usize> = lms_positions.iter().map(|&pos| lms_names[pos]).collect();

    let sorted_lms_indices = if unique_count < lms_positions.len() {
        sais_usize(&reduced, unique_count)
    } else {
        let mut order: Vec<usize> = (0..reduced.len()).collect();
        order.sort_by_key(|&i| reduced[i]);
        order
    };

    // Final induced sort with correctly ordered LMS suffixes.
    let sorted_lms: Vec<usize> = sorted_lms_indices
        .iter()
        .map(|&i| lms_positions[i])
        .collect();
    sa.fill(usize::MAX);
    let mut tails = bucket_tails(&bucket_sizes);
    for &pos in sorted_lms.iter().rev() {
        let c = text[pos] as usize;
        tails[c] -= 1;
        sa[tails[c]] = pos;
    }
    induce(&mut sa, &types, &bucket_sizes, |j| text[j] as usize);

    sa
}

/// Recursive SA-IS for the reduced integer alphabet.
fn sais_usize(text: &[usize], alphabet_size: usize) -> Vec<usize> {
    let n = text.len();
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![0];
    }
    if n == 2 {
        return if text[0] <= text[1] {
            vec![0, 1]
        } else {
            vec![1, 0]
        };
    }

    let types = classify_usize(text);
    let lms_positions: Vec<usize> = (1..n).filter(|&i| is_lms(&types, i)).collect();

    if lms_positions.is_empty() {
        // All L-type or all S-type; sort directly.
        let mut sa: Vec<usize> = (0..n).collect();
        sa.sort_by(|&a, &b| text[a..].cmp(&text[b..]));
        return sa;
    }

    let bucket_sizes = bucket_sizes_usize(text, alphabet_size);

    let mut sa = vec![usize::MAX; n];
    let mut tails = bucket_tails(&bucket_sizes);
    for &pos in lms_positions.iter().rev() {
        tails[text[pos]] -= 1;
        sa[tails[text[pos]]] = pos;
    }
    induce(&mut sa, &types, &bucket_sizes, |j| text[j]);

    let mut name = 0usize;
    let mut prev_pos: Option<usize> = None;
    let mut lms_names = vec![0usize; n];
    for &pos in sa.iter() {
        if !is_lms(&types, pos) {
            continue;
        }
        if let Some(prev) = prev_pos {
            if !lms_equal(text, &types, prev, pos) {
                name += 1;
            }
        }
        lms_names[pos] = name;
        prev_pos = Some(pos);
    }
    let unique_count = name + 1;
    let reduced: Vec<usize> = lms_positions.iter().map(|&pos| lms_names[pos]).collect();

    let sorted_lms_indices = if unique_count < lms_positions.len() {
        sais_usize(&reduced, unique_count)
    } else {
        let mut order: Vec<usize> = (0..reduced.len()).collect();
        order.sort_by_key(|&i| reduced[i]);
        order
    };

    let sorted_lms: Vec<usize> = sorted_lms_indices
        .iter()
        .map(|&i| lms_positions[i])
        .collect();
    sa.fill(usize::MAX);
    let mut tails = bucket_tails(&bucket_sizes);
    for &pos in sorted_lms.iter().rev() {
        tails[text[pos]] -= 1;
        sa[tails[text[pos]]] = pos;
    }
    induce(&mut sa, &types, &bucket_sizes, |j| text[j]);

    sa
}

/// Induce L-type positions left-to-right, then S-type right-to-left.
fn induce<F: Fn(usize) -> usize>(
    sa: &mut [usize],
    types: &[SuffixType],
    bucket_sizes: &[usize],
    sym: F,
) {
    let n = sa.len();

    let mut heads = bucket_heads(bucket_sizes);
    for i in 0..n {
        if sa[i] == usize::MAX || sa[i] == 0 {
            continue;
        }
        let j = sa[i] - 1;
        if types[j] == SuffixType::L {
            let c = sym(j);
            sa[heads[c]] = j;
            heads[c] += 1;
        }
    }

    let mut tails = bucket_tails(bucket_sizes);
    for i in (0..n).rev() {
        if sa[i] == usize::MAX || sa[i] == 0 {
            continue;
        }
        let j = sa[i] - 1;
        if types[j] == SuffixType::S {
            let c = sym(j);
            tails[c] -= 1;
            sa[tails[c]] = j;
        }
    }
}

fn classify_u8(text: &[u8]) -> Vec<SuffixType> {
    let n = text.len();
    let mut types = vec![SuffixType::S; n];
    types[n - 1] = SuffixType::S;
    for i in (0..n - 1).rev() {
        types[i] = match text[i].cmp(&text[i + 1]) {
            std::cmp::Ordering::Greater => SuffixType::L,
            std::cmp::Ordering::Less => SuffixType::S,
            std::cmp::Ordering::Equal => types[i + 1],
        };
    }
    types
}

fn classify_usize(text: &[usize]) -> Vec<SuffixType> {
    let n = text.len();
    let mut types = vec![SuffixType::S; n];
    types[n - 1] = SuffixType::S;
    for i in (0..n - 1).rev() {
        types[i] = match text[i].cmp(&text[i + 1]) {
            std::cmp::Ordering::Greater => SuffixType::L,
            std::cmp::Ordering::Less => SuffixType::S,
            std::cmp::Ordering::Equal => types[i + 1],
        };
    }
    types
}

/// Check if position i is an LMS position.
#[inline]
fn is_lms(types: &[SuffixType], i: usize) -> bool {
    i > 0 && types[i] == SuffixType::S && types[i - 1] == SuffixType::L
}

fn bucket_sizes_u8(text: &[u8]) -> Vec<usize> {
    let mut sizes = vec![0usize; 256];
    for &c in text {
        sizes[c as usize] += 1;
    }
    sizes
}

fn bucket_sizes_usize(text: &[usize], alphabet_size: usize) -> Vec<usize> {
    let mut sizes = vec![0usize; alphabet_size];
    for &c in text {
        sizes[c] += 1;
    }
    sizes
}

fn bucket_heads(sizes: &[usize]) -> Vec<usize> {
    let mut heads = vec![0; sizes.len()];
    let mut sum = 0;
    for (i, &size) in sizes.iter().enumerate() {
        heads[i] = sum;
        sum += size;
    }
    heads
}

fn bucket_tails(sizes: &[usize]) -> Vec<usize> {
    let mut tails = vec![0; sizes.len()];
    let mut sum = 0;
    for (i, &size) in sizes.iter().enumerate() {
        sum += size;
        tails[i] = sum;
    }
    tails
}

/// Compare two LMS substrings for equality.
fn lms_equal<T: PartialEq>(text: &[T], types: &[SuffixType], i: usize, j: usize) -> bool {
    if i == j {
        return true;
    }

    let n = text.len();
    let mut k = 0;
    loop {
        let pi = i + k;
        let pj = j + k;

        if pi >= n || pj >= n {
            return pi >= n && pj >= n;
        }
        if text[pi] != text[pj] || types[pi] != types[pj] {
            return false;
        }
        if k > 0 {
            let lms_i = is_lms(types, pi);
            let lms_j = is_lms(types, pj);
            if lms_i && lms_j {
                return true;
            }
            if lms_i != lms_j {
                return false;
            }
        }
        k += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_sentinel(text: &[u8]) -> Vec<u8> {
        let mut t = text.to_vec();
        t.push(1);
        t
    }

    fn check_sorted_and_complete(text: &[u8]) {
        let t = with_sentinel(text);
        let sa = suffix_array(&t);

        assert_eq!(sa.len(), t.len());

        let mut positions: Vec<u64> = sa.clone();
        positions.sort_unstable();
        let expected: Vec<u64> = (0..t.len() as u64).collect();
        assert_eq!(positions, expected, "not a permutation for {:?}", text);

        for i in 1..sa.len() {
            let a = &t[sa[i - 1] as usize..];
            let b = &t[sa[i] as usize..];
            assert!(a < b, "not sorted at {} for {:?}", i, text);
        }
    }

    #[test]
    fn banana() {
        let t = with_sentinel(b"banana");
        let sa = suffix_array(&t);
        // sentinel, a, ana, anana, banana, na, nana
        assert_eq!(sa, vec![6, 5, 3, 1, 0, 4, 2]);
    }

    #[test]
    fn single_char() {
        assert_eq!(suffix_array(&with_sentinel(b"a")), vec![1, 0]);
    }

    #[test]
    fn repeated_runs() {
        check_sorted_and_complete(b"aaaaaa");
        check_sorted_and_complete(b"abababab");
        check_sorted_and_complete(b"zzzyyyxxx");
    }

    #[test]
    fn classify_banana() {
        let t = with_sentinel(b"banana");
        let types = classify_u8(&t);
        assert_eq!(types[0], SuffixType::L); // b > a
        assert_eq!(types[1], SuffixType::S); // a < n
        assert_eq!(types[2], SuffixType::L); // n > a
        assert_eq!(types[3], SuffixType::S); // a < n
        assert_eq!(types[4], SuffixType::L); // n > a
        assert_eq!(types[5], SuffixType::L); // a > sentinel
        assert_eq!(types[6], SuffixType::S); // sentinel
    }

    #[test]
    fn assorted_texts() {
        for text in [
            &b"abracadabra"[..],
            b"mississippi",
            b"zyxwvutsrqponmlkjihgfedcba",
            b"abcdefghijklmnopqrstuvwxyz",
            b"the quick brown fox jumps over the lazy dog",
        ] {
            check_sorted_and_complete(text);
        }
    }

    #[test]
    fn empty_input() {
        assert!(suffix_array(&[]).is_empty());
    }
}
