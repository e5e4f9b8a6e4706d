// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use proptest::prelude::*;

use super::*;
use crate::store::MemoryStore;
use crate::time::test_clock;

fn allocator() -> CodeAllocator {
    CodeAllocator::new(Arc::new(MemoryStore::new()))
}

// ── generation ────────────────────────────────────────────────────────

#[test]
fn generated_codes_are_well_formed() -> anyhow::Result<()> {
    let alloc = allocator();
    for _ in 0..200 {
        let code = alloc.generate()?;
        assert!(
            CodeAllocator::is_valid_format(&code),
            "generated code fails its own validator: {code}"
        );
        assert_eq!(code.len(), 11);
    }
    Ok(())
}

proptest! {
    #[test]
    fn format_accepts_exactly_grouped_uppercase(
        a in "[A-Z0-9]{3}", b in "[A-Z0-9]{3}", c in "[A-Z0-9]{3}"
    ) {
        let code = format!("{}-{}-{}", a, b, c);
        prop_assert!(CodeAllocator::is_valid_format(&code));
    }

    #[test]
    fn format_rejects_lowercase(code in "[a-z0-9]{3}-[a-z0-9]{3}-[a-z0-9]{3}") {
        // At least one lowercase letter makes it invalid; all-digit draws
        // are valid by construction, so skip them.
        prop_assume!(code.chars().any(|c| c.is_ascii_lowercase()));
        prop_assert!(!CodeAllocator::is_valid_format(&code));
    }
}

#[yare::parameterized(
    missing_hyphens = { "ABC123XYZ" },
    wrong_grouping  = { "AB-C123-XYZ" },
    too_long        = { "ABCD-123-XYZ" },
    trailing_junk   = { "ABC-123-XYZ " },
    empty           = { "" },
)]
fn format_rejects(code: &str) {
    assert!(!CodeAllocator::is_valid_format(code));
}

// ── registration ──────────────────────────────────────────────────────

#[tokio::test]
async fn register_is_first_writer_wins() -> anyhow::Result<()> {
    let alloc = allocator();
    assert_eq!(alloc.register("ABC-123-XYZ", "R1").await?, Registration::Registered);
    assert_eq!(alloc.register("ABC-123-XYZ", "R2").await?, Registration::Duplicate);

    // The duplicate attempt must not have clobbered ownership.
    let validation = alloc.validate("ABC-123-XYZ").await?;
    assert_eq!(validation, Validation::Ok { runner_id: "R1".to_owned() });
    assert_eq!(alloc.code_of("R1").await?, Some("ABC-123-XYZ".to_owned()));
    Ok(())
}

#[tokio::test]
async fn register_with_retry_returns_a_registered_code() -> anyhow::Result<()> {
    let alloc = allocator();
    let code = alloc.register_with_retry("R1").await?.ok_or_else(|| anyhow::anyhow!("exhausted"))?;
    assert!(CodeAllocator::is_valid_format(&code));
    assert_eq!(alloc.code_of("R1").await?, Some(code.clone()));
    assert_eq!(alloc.validate(&code).await?, Validation::Ok { runner_id: "R1".to_owned() });
    Ok(())
}

// ── validation and expiry ─────────────────────────────────────────────

#[tokio::test]
async fn unknown_code_is_not_found() -> anyhow::Result<()> {
    let alloc = allocator();
    assert_eq!(alloc.validate("ZZZ-ZZZ-ZZZ").await?, Validation::NotFound);
    Ok(())
}

#[tokio::test]
async fn unused_code_expires_after_deadline() -> anyhow::Result<()> {
    let alloc = allocator();
    alloc.register("ABC-123-XYZ", "R1").await?;

    test_clock::advance_ms(CODE_TTL_MS + 1);
    assert_eq!(alloc.validate("ABC-123-XYZ").await?, Validation::Expired);
    // The sweep removed both sides; a second look is a plain miss.
    assert_eq!(alloc.validate("ABC-123-XYZ").await?, Validation::NotFound);
    assert_eq!(alloc.code_of("R1").await?, None);
    Ok(())
}

#[tokio::test]
async fn used_code_never_expires() -> anyhow::Result<()> {
    let alloc = allocator();
    alloc.register("ABC-123-XYZ", "R1").await?;
    alloc.mark_used("ABC-123-XYZ").await?;

    test_clock::advance_ms(CODE_TTL_MS * 2 + 1);
    assert_eq!(
        alloc.validate("ABC-123-XYZ").await?,
        Validation::Ok { runner_id: "R1".to_owned() }
    );
    // Reverse index was persisted along with the entry.
    assert_eq!(alloc.code_of("R1").await?, Some("ABC-123-XYZ".to_owned()));
    Ok(())
}

#[tokio::test]
async fn mark_used_counts_monotonically() -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    let alloc = CodeAllocator::new(store.clone());
    alloc.register("ABC-123-XYZ", "R1").await?;
    alloc.mark_used("ABC-123-XYZ").await?;
    alloc.mark_used("ABC-123-XYZ").await?;

    use crate::store::{keys, Store};
    let json = store.get(&keys::code("ABC-123-XYZ")).await?.ok_or_else(|| {
        anyhow::anyhow!("entry missing")
    })?;
    let entry: CodeEntry = serde_json::from_str(&json)?;
    assert_eq!(entry.used_count, 2);
    Ok(())
}

#[tokio::test]
async fn mark_used_on_absent_code_is_noop() -> anyhow::Result<()> {
    let alloc = allocator();
    alloc.mark_used("ZZZ-ZZZ-ZZZ").await?;
    Ok(())
}

// ── invalidation ──────────────────────────────────────────────────────

#[tokio::test]
async fn invalidate_of_a_superseded_code_keeps_the_new_reverse_index() -> anyhow::Result<()> {
    let alloc = allocator();
    alloc.register("AAA-AAA-AAA", "R1").await?;
    // A fresh registration repoints the reverse index before the old
    // entry is swept.
    alloc.register("BBB-BBB-BBB", "R1").await?;

    alloc.invalidate("AAA-AAA-AAA").await?;
    assert_eq!(alloc.validate("AAA-AAA-AAA").await?, Validation::NotFound);
    assert_eq!(alloc.code_of("R1").await?, Some("BBB-BBB-BBB".to_owned()));
    assert_eq!(
        alloc.validate("BBB-BBB-BBB").await?,
        Validation::Ok { runner_id: "R1".to_owned() }
    );
    Ok(())
}

#[tokio::test]
async fn invalidate_removes_entry_and_reverse_index() -> anyhow::Result<()> {
    let alloc = allocator();
    alloc.register("ABC-123-XYZ", "R1").await?;
    alloc.invalidate("ABC-123-XYZ").await?;

    assert_eq!(alloc.validate("ABC-123-XYZ").await?, Validation::NotFound);
    assert_eq!(alloc.code_of("R1").await?, None);

    // Idempotent.
    alloc.invalidate("ABC-123-XYZ").await?;
    Ok(())
}
