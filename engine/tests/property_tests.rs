use proptest::prelude::*;
use sleuth_engine::agent::{parse_action, ActionKind, Budget, QueryKey};
use sleuth_engine::secrets::scrub;

fn kind_name() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("query-people"),
        Just("query-places"),
        Just("query-db"),
        Just("query-gps"),
    ]
}

proptest! {
    // Label order never changes the parsed action
    #[test]
    fn test_label_order_is_irrelevant(
        kind in kind_name(),
        target in "[A-Z][A-Z ]{0,20}[A-Z]",
        reasoning in "[a-z][a-z ]{0,30}[a-z]",
        order in Just(vec![0usize, 1, 2, 3]).prop_shuffle(),
    ) {
        let lines = [
            format!("ACTION: {}", kind),
            format!("QUERY: {}", target),
            format!("REASONING: {}", reasoning),
            "IS_FINAL: false".to_string(),
        ];
        let text = order
            .iter()
            .map(|&i| lines[i].as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let action = parse_action(&text).unwrap();
        prop_assert_eq!(action.kind, ActionKind::parse(kind));
        prop_assert_eq!(action.target, target);
        prop_assert_eq!(action.reasoning, Some(reasoning));
        prop_assert!(!action.is_final);
    }

    // Text without any recognized label is always malformed
    #[test]
    fn test_unlabelled_text_is_malformed(text in "[a-z ,.]{0,80}") {
        prop_assert!(parse_action(&text).is_err());
    }

    // consumed never exceeds the initial budget, however often consume is called
    #[test]
    fn test_budget_is_bounded(initial in 0u32..50, attempts in 0usize..100) {
        let mut budget = Budget::new(initial);
        let mut granted = 0u32;
        for _ in 0..attempts {
            if budget.consume() {
                granted += 1;
            }
        }

        prop_assert!(budget.consumed() <= initial);
        prop_assert_eq!(budget.consumed(), granted);
        prop_assert_eq!(budget.remaining(), initial - granted);
        prop_assert_eq!(budget.is_exhausted(), granted == initial);
    }

    // Repeat keys ignore surrounding whitespace and case
    #[test]
    fn test_query_key_normalization(
        kind in kind_name(),
        target in "[a-zA-Z]{1,12}",
        pad in "[ \t]{0,3}",
    ) {
        let kind = ActionKind::parse(kind);
        let padded = format!("{}{}{}", pad, target.to_uppercase(), pad);
        prop_assert_eq!(
            QueryKey::new(&kind, &target.to_lowercase()),
            QueryKey::new(&kind, &padded)
        );
    }

    // The API key never survives scrubbing
    #[test]
    fn test_scrub_removes_api_key(key in "[a-f0-9]{8,40}") {
        let body = format!("{{\"task\":\"loop\",\"apikey\":\"{}\",\"answer\":\"LODZ\"}}", key);
        let scrubbed = scrub(&body);
        prop_assert!(!scrubbed.contains(&key));
        prop_assert!(scrubbed.contains("LODZ"));
    }
}
