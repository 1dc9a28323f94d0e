use index::Pattern;

/// Candidate relationship chains over `alphabet`.
///
/// For each length `r` in `1..=min(max_length, n)`, `r`-combinations are
/// taken in index order and every permutation of each is emitted in
/// lexicographic order until `max_per_length` patterns of that length exist.
/// Repeated alphabet entries are collapsed first, keeping the first.
///
/// The cap makes the search incomplete on purpose: with a large vocabulary
/// only the chains built from the first few relationship types are tried.
pub fn generate(alphabet: &[String], max_length: usize, max_per_length: usize) -> Vec<Pattern> {
    let mut symbols: Vec<&String> = Vec::with_capacity(alphabet.len());
    for s in alphabet {
        if !symbols.contains(&s) {
            symbols.push(s);
        }
    }

    let n = symbols.len();
    let mut patterns = Vec::new();
    if max_per_length == 0 {
        return patterns;
    }

    for r in 1..=max_length.min(n) {
        let mut count = 0;
        let mut combination: Vec<usize> = (0..r).collect();

        'combinations: loop {
            let mut order = combination.clone();
            loop {
                patterns.push(order.iter().map(|&i| symbols[i].clone()).collect());
                count += 1;
                if count >= max_per_length || !next_permutation(&mut order) {
                    break;
                }
            }
            if count >= max_per_length || !next_combination(&mut combination, n) {
                break 'combinations;
            }
        }
    }

    patterns
}

/// Number of patterns `generate` yields for one length.
pub fn expected_count(n: usize, r: usize, max_per_length: usize) -> usize {
    if r == 0 || r > n {
        return 0;
    }
    // n! / (n-r)!, saturating well before overflow matters for the cap.
    let mut arrangements: usize = 1;
    for k in (n - r + 1)..=n {
        arrangements = arrangements.saturating_mul(k);
        if arrangements >= max_per_length {
            return max_per_length;
        }
    }
    arrangements.min(max_per_length)
}

/// Advance to the next lexicographic permutation in place.
fn next_permutation(v: &mut [usize]) -> bool {
    if v.len() < 2 {
        return false;
    }
    let Some(i) = (0..v.len() - 1).rev().find(|&i| v[i] < v[i + 1]) else {
        return false;
    };
    let j = (i + 1..v.len()).rev().find(|&j| v[j] > v[i]).unwrap_or(i + 1);
    v.swap(i, j);
    v[i + 1..].reverse();
    true
}

/// Advance to the next `r`-combination of `0..n` in index order.
fn next_combination(c: &mut [usize], n: usize) -> bool {
    let r = c.len();
    let Some(i) = (0..r).rev().find(|&i| c[i] != i + n - r) else {
        return false;
    };
    c[i] += 1;
    for j in i + 1..r {
        c[j] = c[j - 1] + 1;
    }
    true
}
