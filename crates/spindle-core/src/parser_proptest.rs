#[cfg(test)]
mod proptest_parser {
    use crate::command::Command;
    use crate::parser::*;
    use proptest::prelude::*;

    // Bytes biased towards the target token so splits land inside it often.
    fn command_bytes() -> impl Strategy<Value = Vec<u8>> {
        prop::collection::vec(
            prop_oneof![
                4 => prop::sample::select(b"r:0123456789\n\r".to_vec()),
                1 => prop::sample::select(b"sxcvfdam+-".to_vec()),
                1 => any::<u8>(),
            ],
            0..200,
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(2000))]

        // Property: how the stream is fragmented never changes what is parsed
        #[test]
        fn fragmentation_is_invisible(
            bytes in command_bytes(),
            cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..12),
        ) {
            let mut whole = CommandParser::new();
            let expected = whole.feed(&bytes);

            let mut points: Vec<usize> = cuts.iter().map(|i| i.index(bytes.len() + 1)).collect();
            points.sort_unstable();
            points.dedup();

            let mut fragmented = CommandParser::new();
            let mut got = Vec::new();
            let mut start = 0;
            for p in points.into_iter().chain(std::iter::once(bytes.len())) {
                got.extend(fragmented.feed(&bytes[start..p]));
                start = p;
            }

            prop_assert_eq!(&got, &expected);
            prop_assert_eq!(fragmented.state(), whole.state());
        }

        // Property: a terminated target token always round-trips its value
        #[test]
        fn terminated_target_yields_its_value(value in 0u32..=99_999, tail in prop::sample::select(b"\nsx".to_vec())) {
            let mut parser = CommandParser::new();
            let mut input = format!("r:{value}").into_bytes();
            input.push(tail);
            let cmds = parser.feed(&input);
            prop_assert_eq!(cmds[0], Command::SetTargetRpm(value));
            prop_assert_eq!(parser.state(), ParserState::Normal);
        }

        // Property: the parser never panics and always ends in a known state
        #[test]
        fn arbitrary_bytes_are_handled(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
            let mut parser = CommandParser::new();
            let cmds = parser.feed(&bytes);
            prop_assert!(cmds.len() <= bytes.len());
        }
    }
}
