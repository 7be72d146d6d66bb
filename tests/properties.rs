mod common;

use common::*;
use proptest::prelude::*;
use slack_history::export_channel;
use slack_history::model::Depth;
use slack_history::slack_render::{SlackReferences, render_mrkdwn};

fn run<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
        .block_on(future)
}

/// Tokens that are already plain markdown.
fn clean_token() -> impl Strategy<Value = String> {
    let word = "[a-z]{1,8}";
    prop_oneof![
        word.prop_map(|w| w),
        word.prop_map(|w| format!("**{w}**")),
        word.prop_map(|w| format!("_{w}_")),
        word.prop_map(|w| format!("~~{w}~~")),
        word.prop_map(|w| format!("`{w}`")),
        (word, word).prop_map(|(t, host)| format!("[{t}](https://{host}.io)")),
    ]
}

fn clean_line() -> impl Strategy<Value = String> {
    (
        prop_oneof![Just(""), Just("> "), Just("- "), Just("  - ")],
        prop::collection::vec(clean_token(), 1..6),
    )
        .prop_map(|(prefix, tokens)| format!("{prefix}{}", tokens.join(" ")))
}

proptest! {
    #[test]
    fn conversion_is_total(text in any::<String>()) {
        let out = render_mrkdwn(&text, &SlackReferences::default());
        prop_assert_eq!(out.is_empty(), text.is_empty());
    }

    #[test]
    fn conversion_is_total_on_markup_soup(text in "[*_~`<>@#!|&;a-z \n]{0,60}") {
        let out = render_mrkdwn(&text, &SlackReferences::default());
        prop_assert_eq!(out.is_empty(), text.is_empty());
    }

    #[test]
    fn clean_markdown_is_unchanged(lines in prop::collection::vec(clean_line(), 1..5)) {
        let text = lines.join("\n");
        prop_assert_eq!(render_mrkdwn(&text, &SlackReferences::default()), text);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn caps_and_ordering_hold(
        reply_counts in prop::collection::vec(0usize..6, 0..25),
        max_messages in 1usize..30,
        max_per_thread in 0usize..4,
        page_size in 1u16..7,
    ) {
        let mut history = Vec::new();
        let mut fake = FakeSlack::new().with_user("U1", "alice");
        for (i, &replies) in reply_counts.iter().enumerate() {
            let n = (i as u64) * 10;
            if replies == 0 {
                history.push(message(n, "U1", "top"));
            } else {
                let root = thread_root(n, "U1", "root", replies);
                let thread = (1..=replies as u64).map(|j| reply(n, n + j, "U1", "re")).collect();
                fake = fake.with_thread(&root, thread);
                history.push(root);
            }
        }
        let gateway = gateway(fake.with_history(history));
        let spec = spec()
            .with_max_messages(max_messages)
            .with_max_messages_per_thread(max_per_thread)
            .with_page_size(page_size);

        let doc = run(export_channel(&gateway, &spec)).unwrap();

        let kept = reply_counts.len().min(max_messages);
        let roots: Vec<_> = doc.roots().collect();
        prop_assert_eq!(roots.len(), kept);
        prop_assert_eq!(doc.summary.truncated, reply_counts.len() > max_messages);

        // the newest roots survive the cap
        let first_kept = reply_counts.len() - kept;
        for (root, i) in roots.iter().zip(first_kept..) {
            prop_assert_eq!(root.ts.as_str(), ts(i as u64 * 10));
        }
        prop_assert!(roots.windows(2).all(|w| w[0].ts < w[1].ts));

        let mut expected_dropped = 0;
        for (root, i) in roots.iter().zip(first_kept..) {
            let replies = doc.replies_of(root.ordinal);
            prop_assert_eq!(replies.len(), reply_counts[i].min(max_per_thread));
            prop_assert!(replies.iter().all(|r| r.depth == Depth::Reply && r.ts > root.ts));
            prop_assert!(replies.windows(2).all(|w| w[0].ts < w[1].ts));
            expected_dropped += reply_counts[i].saturating_sub(max_per_thread);
        }
        prop_assert_eq!(doc.summary.dropped_replies, expected_dropped);
        prop_assert!(doc.messages.iter().enumerate().all(|(i, m)| m.ordinal == i));
    }
}
