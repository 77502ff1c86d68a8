//! Property tests for whole-input matching.
//!
//! Random patterns over a tiny alphabet are checked against the `regex`
//! crate, which serves as the reference for what each pattern means.

use proptest::prelude::*;

use regex_fsm::{MatcherMemory, compile, matches};

/// Strategy for patterns of up to six atoms drawn from `a`, `b` and `.`,
/// each optionally followed by `*` or `+`.
fn arb_pattern() -> impl Strategy<Value = String> {
    let atom = prop_oneof![Just('a'), Just('b'), Just('.')];
    let quantifier = prop_oneof![Just(""), Just("*"), Just("+")];
    prop::collection::vec((atom, quantifier), 0..6).prop_map(|atoms| {
        atoms
            .into_iter()
            .map(|(atom, quantifier)| format!("{atom}{quantifier}"))
            .collect()
    })
}

fn oracle(pattern: &str, input: &str) -> bool {
    let full = format!("(?s-u)^(?:{})$", pattern);
    regex::bytes::Regex::new(&full)
        .expect("regex crate should parse pattern")
        .is_match(input.as_bytes())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Property: our verdict equals the `regex` crate's anchored verdict.
    #[test]
    fn agrees_with_regex_crate(pattern in arb_pattern(), input in "[abc]{0,8}") {
        let re = compile(&pattern).unwrap();
        prop_assert_eq!(
            matches(&re, &input),
            oracle(&pattern, &input),
            "pattern `{}` on input {:?}",
            pattern,
            input
        );
    }

    /// Property: the empty input matches iff every atom is starred.
    #[test]
    fn empty_input_needs_every_atom_skippable(pattern in arb_pattern()) {
        let re = compile(&pattern).unwrap();
        let atoms = pattern.chars().filter(|c| !matches!(c, '*' | '+')).count();
        let stars = pattern.chars().filter(|&c| c == '*').count();
        prop_assert_eq!(matches(&re, ""), atoms == stars);
    }

    /// Property: results do not depend on what was matched before with the
    /// same regex or the same memory.
    #[test]
    fn repeated_and_interleaved_calls_agree(
        pattern in arb_pattern(),
        first in "[abc]{0,8}",
        second in "[abc]{0,8}"
    ) {
        let re = compile(&pattern).unwrap();
        let expected_first = matches(&re, &first);
        let expected_second = matches(&re, &second);

        let mut memory = MatcherMemory::default();
        for _ in 0..3 {
            let mut matcher = memory.matcher(&re);
            matcher.chunk(first.as_bytes());
            prop_assert_eq!(matcher.finish(), expected_first);

            let mut matcher = memory.matcher(&re);
            matcher.chunk(second.as_bytes());
            prop_assert_eq!(matcher.finish(), expected_second);
        }
    }

    /// Property: byte-wise feeding and chunked feeding agree.
    #[test]
    fn step_and_chunk_agree(
        pattern in arb_pattern(),
        input in "[abc]{0,8}",
        split in 0usize..9
    ) {
        let re = compile(&pattern).unwrap();
        let bytes = input.as_bytes();
        let split = split.min(bytes.len());

        let mut memory = MatcherMemory::default();
        let mut matcher = memory.matcher(&re);
        matcher.chunk(&bytes[..split]);
        matcher.chunk(&bytes[split..]);
        let chunked = matcher.finish();

        let mut matcher = memory.matcher(&re);
        for &b in bytes {
            matcher.step(b);
        }
        prop_assert_eq!(matcher.finish(), chunked);
    }
}
