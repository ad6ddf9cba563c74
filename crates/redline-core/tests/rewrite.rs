use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use redline_core::{
    DecorationKind, Document, EditError, EditKind, Editor, EditorEvent, InjectionMode, Marks,
    Node, Op, PluginRegistry, Point, PromptSpec, Selection, TextNode, Transaction, UpstreamError,
};

fn prompt() -> PromptSpec {
    PromptSpec::new("Improve the writing.")
}

fn select(editor: &mut Editor, block: usize, range: std::ops::Range<usize>) {
    editor.set_selection(Selection::new(
        Point::new(vec![block, 0], range.start),
        Point::new(vec![block, 0], range.end),
    ));
}

#[test]
fn paragraph_rewrite_becomes_a_pending_replace() -> anyhow::Result<()> {
    let mut editor = Editor::from_paragraphs(["The cat sat."]);

    let ticket = editor.begin_rewrite(prompt())?;
    assert!(ticket.whole_block);
    assert_eq!(ticket.block_path, vec![0]);
    assert_eq!(ticket.range, 0..12);
    assert_eq!(ticket.old_text, "The cat sat.");
    assert_eq!(editor.decorations().len(), 1);
    assert_eq!(
        editor.decorations().get(&ticket.id).map(|d| d.kind),
        Some(DecorationKind::Loading)
    );
    assert_eq!(editor.take_events(), vec![EditorEvent::DecorationsChanged]);
    assert!(!editor.can_undo());

    let applied = editor.complete_rewrite(&ticket.id, Ok("The dog sat.".to_string()))?;
    assert_eq!(applied.edit_ids.len(), 1);
    assert!(editor.decorations().is_empty());
    assert_eq!(editor.pending_rewrites().count(), 0);

    assert_eq!(editor.doc().plain_text(), "The dog sat.");
    assert_eq!(editor.doc().original_text(), "The cat sat.");
    let entry = editor.edits().get(&applied.edit_ids[0]).unwrap();
    assert_eq!(entry.kind, EditKind::Replace);
    assert_eq!(entry.old_text, "cat");
    assert_eq!(entry.new_text, "dog");
    assert_eq!(editor.selection().focus, Point::new(vec![0, 2], 5));

    let events = editor.take_events();
    assert!(events.contains(&EditorEvent::DocumentChanged));
    assert!(events.contains(&EditorEvent::DecorationsChanged));
    Ok(())
}

#[test]
fn one_undo_reverts_a_rewrite() -> anyhow::Result<()> {
    let mut editor = Editor::from_paragraphs(["Hello world"]);
    let ticket = editor.begin_rewrite(prompt())?;
    editor.complete_rewrite(&ticket.id, Ok("Hello".to_string()))?;
    assert_eq!(editor.edits().counts().delete, 1);

    assert!(editor.undo());
    assert!(!editor.can_undo());
    assert_eq!(editor.doc().children, vec![Node::paragraph("Hello world")]);
    assert!(editor.edits().is_empty());
    assert!(editor.decorations().is_empty());
    Ok(())
}

#[test]
fn empty_paragraph_gets_an_add_span() -> anyhow::Result<()> {
    let mut editor = Editor::with_core_plugins();
    let ticket = editor.begin_rewrite(prompt())?;
    assert_eq!(ticket.old_text, "");

    let applied = editor.complete_rewrite(&ticket.id, Ok("New sentence".to_string()))?;
    let entry = editor.edits().get(&applied.edit_ids[0]).unwrap();
    assert_eq!(entry.kind, EditKind::Add);
    assert_eq!(editor.doc().plain_text(), "New sentence");

    editor.reject_edit(&applied.edit_ids[0])?;
    assert_eq!(editor.doc().children, vec![Node::paragraph("")]);
    Ok(())
}

#[test]
fn upstream_failure_changes_nothing() -> anyhow::Result<()> {
    let mut editor = Editor::from_paragraphs(["The cat sat."]);
    let doc_before = editor.doc().clone();
    let ticket = editor.begin_rewrite(prompt())?;

    let result = editor.complete_rewrite(&ticket.id, Err(UpstreamError::new("timed out")));
    assert_eq!(
        result,
        Err(EditError::Upstream {
            message: "timed out".to_string()
        })
    );
    assert_eq!(editor.doc(), &doc_before);
    assert!(editor.decorations().is_empty());
    assert!(!editor.can_undo());
    Ok(())
}

#[test]
fn edited_target_is_stale() -> anyhow::Result<()> {
    let mut editor = Editor::from_paragraphs(["The cat sat."]);
    let ticket = editor.begin_rewrite(prompt())?;

    editor.apply(Transaction::new(vec![Op::InsertText {
        path: vec![0, 0],
        offset: 4,
        text: "big ".to_string(),
    }]))?;
    let doc_before = editor.doc().clone();

    assert_eq!(
        editor.complete_rewrite(&ticket.id, Ok("The dog sat.".to_string())),
        Err(EditError::StaleTarget)
    );
    assert_eq!(editor.doc(), &doc_before);
    assert!(editor.decorations().is_empty());
    Ok(())
}

#[test]
fn shifted_target_is_found_again() -> anyhow::Result<()> {
    let mut editor = Editor::from_paragraphs(["The cat sat."]);
    select(&mut editor, 0, 4..7);
    let ticket = editor.begin_rewrite(prompt())?;
    assert!(!ticket.whole_block);
    assert_eq!(ticket.old_text, "cat");

    editor.apply(Transaction::new(vec![Op::InsertText {
        path: vec![0, 0],
        offset: 0,
        text: "A: ".to_string(),
    }]))?;

    editor.complete_rewrite(&ticket.id, Ok("dog".to_string()))?;
    assert_eq!(editor.doc().plain_text(), "A: The dog sat.");
    assert_eq!(editor.doc().original_text(), "A: The cat sat.");
    Ok(())
}

#[test]
fn loading_region_follows_typing_before_it() -> anyhow::Result<()> {
    let mut editor = Editor::from_paragraphs(["aaa bbb"]);
    select(&mut editor, 0, 4..7);
    let ticket = editor.begin_rewrite(prompt())?;
    editor.take_events();

    editor.apply(Transaction::new(vec![Op::InsertText {
        path: vec![0, 0],
        offset: 0,
        text: "XXXX".to_string(),
    }]))?;
    assert_eq!(
        editor.decorations().get(&ticket.id).map(|d| d.range.clone()),
        Some(8..11)
    );
    assert!(editor.take_events().contains(&EditorEvent::DecorationsChanged));

    // The text in flight is now at 8..11 and cannot be requested twice.
    select(&mut editor, 0, 8..11);
    assert!(matches!(
        editor.begin_rewrite(prompt()),
        Err(EditError::InvalidInput(_))
    ));
    select(&mut editor, 0, 0..4);
    let other = editor.begin_rewrite(prompt())?;
    assert!(editor.cancel_rewrite(&other.id));

    editor.complete_rewrite(&ticket.id, Ok("ccc".to_string()))?;
    assert_eq!(editor.doc().plain_text(), "XXXXaaa ccc");
    assert_eq!(editor.doc().original_text(), "XXXXaaa bbb");
    Ok(())
}

#[test]
fn repeated_target_text_is_tracked_through_edits() -> anyhow::Result<()> {
    let mut editor = Editor::from_paragraphs(["bbb bbb"]);
    select(&mut editor, 0, 4..7);
    let ticket = editor.begin_rewrite(prompt())?;

    editor.apply(Transaction::new(vec![Op::InsertText {
        path: vec![0, 0],
        offset: 0,
        text: "XX".to_string(),
    }]))?;
    editor.apply(Transaction::new(vec![Op::RemoveText {
        path: vec![0, 0],
        range: 0..1,
    }]))?;
    assert_eq!(editor.doc().plain_text(), "Xbbb bbb");
    assert_eq!(
        editor.decorations().get(&ticket.id).map(|d| d.range.clone()),
        Some(5..8)
    );

    editor.complete_rewrite(&ticket.id, Ok("ccc".to_string()))?;
    assert_eq!(editor.doc().plain_text(), "Xbbb ccc");
    Ok(())
}

#[test]
fn loading_region_survives_rebuilds_of_its_block() -> anyhow::Result<()> {
    let mut editor = Editor::from_paragraphs(["cat cat cat"]);
    select(&mut editor, 0, 0..3);
    let first = editor.begin_rewrite(prompt())?;
    select(&mut editor, 0, 8..11);
    let last = editor.begin_rewrite(prompt())?;

    editor.complete_rewrite(&first.id, Ok("big dog".to_string()))?;
    assert_eq!(editor.doc().plain_text(), "big dog cat cat");
    assert_eq!(
        editor.decorations().get(&last.id).map(|d| d.range.clone()),
        Some(12..15)
    );

    editor.reject_all_pending()?;
    assert_eq!(
        editor.decorations().get(&last.id).map(|d| d.range.clone()),
        Some(8..11)
    );

    editor.complete_rewrite(&last.id, Ok("dog".to_string()))?;
    assert_eq!(editor.doc().plain_text(), "cat cat dog");
    assert_eq!(editor.doc().original_text(), "cat cat cat");
    Ok(())
}

#[test]
fn failed_transaction_queues_no_events() -> anyhow::Result<()> {
    let mut editor = Editor::from_paragraphs(["First.", "Second."]);
    editor.set_selection(Selection::collapsed(Point::new(vec![1, 0], 0)));
    let ticket = editor.begin_rewrite(prompt())?;
    editor.take_events();

    let result = editor.apply(Transaction::new(vec![
        Op::InsertNode {
            path: vec![0],
            node: Node::paragraph("Intro"),
        },
        Op::InsertText {
            path: vec![2, 0],
            offset: 0,
            text: "Very ".to_string(),
        },
        Op::RemoveNode { path: vec![9] },
    ]));
    assert!(result.is_err());
    assert!(!editor.has_pending_events());
    assert_eq!(editor.doc().plain_text(), "First.\nSecond.");
    let decoration = editor.decorations().get(&ticket.id).unwrap();
    assert_eq!(decoration.block_path, vec![1]);
    assert_eq!(decoration.range, 0..7);
    Ok(())
}

#[test]
fn rewritten_text_keeps_link_and_code_formatting() -> anyhow::Result<()> {
    let marks = Marks {
        code: true,
        link: Some("https://example.com/docs".to_string()),
        ..Marks::default()
    };
    let doc = Document {
        children: vec![Node::paragraph_with(vec![Node::Text(TextNode {
            text: "see the docs".to_string(),
            marks: marks.clone(),
        })])],
    };
    let mut editor = Editor::new(
        doc,
        Selection::collapsed(Point::new(vec![0, 0], 0)),
        PluginRegistry::core(),
    );

    let ticket = editor.begin_rewrite(prompt())?;
    editor.complete_rewrite(&ticket.id, Ok("read the docs".to_string()))?;
    let Node::Element(block) = &editor.doc().children[0] else {
        panic!("expected a paragraph");
    };
    for node in &block.children {
        if let Node::Text(t) = node
            && !t.text.is_empty()
        {
            assert_eq!(t.marks.without_suggestion(), marks, "{:?}", t.text);
        }
    }

    editor.accept_all_pending()?;
    assert_eq!(editor.doc().plain_text(), "read the docs");
    let Node::Element(block) = &editor.doc().children[0] else {
        panic!("expected a paragraph");
    };
    assert!(
        block
            .children
            .iter()
            .all(|n| matches!(n, Node::Text(t) if t.text.is_empty() || t.marks == marks))
    );
    Ok(())
}

#[test]
fn decoration_follows_its_block() -> anyhow::Result<()> {
    let mut editor = Editor::from_paragraphs(["First.", "Second."]);
    editor.set_selection(Selection::collapsed(Point::new(vec![1, 0], 0)));
    let ticket = editor.begin_rewrite(prompt())?;
    assert_eq!(ticket.block_path, vec![1]);

    editor.apply(Transaction::new(vec![Op::InsertNode {
        path: vec![0],
        node: Node::paragraph("Intro"),
    }]))?;
    assert_eq!(editor.decorations().get(&ticket.id).unwrap().block_path, vec![2]);

    editor.complete_rewrite(&ticket.id, Ok("Second!".to_string()))?;
    assert_eq!(editor.doc().plain_text(), "Intro\nFirst.\nSecond!");
    assert_eq!(editor.edits().entries()[0].segments[0].block_path, vec![2]);
    Ok(())
}

#[test]
fn removed_block_is_stale() -> anyhow::Result<()> {
    let mut editor = Editor::from_paragraphs(["First.", "Second."]);
    let ticket = editor.begin_rewrite(prompt())?;

    editor.apply(Transaction::new(vec![Op::RemoveNode { path: vec![0] }]))?;
    assert!(editor.decorations().is_empty());

    assert_eq!(
        editor.complete_rewrite(&ticket.id, Ok("Changed.".to_string())),
        Err(EditError::StaleTarget)
    );
    assert_eq!(editor.doc().plain_text(), "Second.");
    Ok(())
}

#[test]
fn overlapping_rewrites_are_refused() -> anyhow::Result<()> {
    let mut editor = Editor::from_paragraphs(["The cat sat on the mat."]);
    select(&mut editor, 0, 4..7);
    let first = editor.begin_rewrite(prompt())?;

    select(&mut editor, 0, 5..12);
    assert!(matches!(
        editor.begin_rewrite(prompt()),
        Err(EditError::InvalidInput(_))
    ));

    // A disjoint range in the same block is fine.
    select(&mut editor, 0, 15..22);
    let second = editor.begin_rewrite(prompt())?;
    assert_eq!(editor.pending_rewrites().count(), 2);

    assert!(editor.cancel_rewrite(&first.id));
    assert!(editor.cancel_rewrite(&second.id));
    assert!(editor.decorations().is_empty());
    Ok(())
}

#[test]
fn target_with_pending_edits_is_refused() {
    let doc = Document {
        children: vec![Node::paragraph_with(vec![
            Node::text("The "),
            Node::suggestion("s1", "cat", "dog"),
            Node::text(" sat."),
        ])],
    };
    let mut editor = Editor::new(
        doc,
        Selection::collapsed(Point::new(vec![0, 0], 0)),
        PluginRegistry::core(),
    );

    assert!(matches!(
        editor.begin_rewrite(prompt()),
        Err(EditError::InvalidInput(_))
    ));

    // The plain prefix alone is a valid target.
    select(&mut editor, 0, 0..3);
    assert!(editor.begin_rewrite(prompt()).is_ok());
}

#[test]
fn selection_across_blocks_is_refused() {
    let mut editor = Editor::from_paragraphs(["One.", "Two."]);
    editor.set_selection(Selection::new(
        Point::new(vec![0, 0], 1),
        Point::new(vec![1, 0], 2),
    ));
    assert!(matches!(
        editor.begin_rewrite(prompt()),
        Err(EditError::InvalidInput(_))
    ));
    assert!(editor.decorations().is_empty());
}

#[test]
fn paragraph_mode_ignores_the_selection() -> anyhow::Result<()> {
    let mut editor = Editor::from_paragraphs(["The cat sat."]);
    select(&mut editor, 0, 4..7);
    let ticket = editor.begin_rewrite(PromptSpec {
        injection_mode: InjectionMode::Paragraph,
        ..prompt()
    })?;
    assert!(ticket.whole_block);
    assert_eq!(ticket.old_text, "The cat sat.");
    Ok(())
}

#[test]
fn output_parsing_extracts_the_answer() -> anyhow::Result<()> {
    let mut editor = Editor::from_paragraphs(["The cat sat."]);
    let ticket = editor.begin_rewrite(PromptSpec {
        output_parsing_pattern: Some(r"(?s)<out>(.*?)</out>".to_string()),
        output_parsing_replacement: Some("$1".to_string()),
        ..prompt()
    })?;

    editor.complete_rewrite(
        &ticket.id,
        Ok("Sure! <out>The dog sat.</out> Anything else?".to_string()),
    )?;
    assert_eq!(editor.doc().plain_text(), "The dog sat.");
    Ok(())
}

#[test]
fn broken_output_pattern_uses_raw_output() -> anyhow::Result<()> {
    let mut editor = Editor::from_paragraphs(["The cat sat."]);
    let ticket = editor.begin_rewrite(PromptSpec {
        output_parsing_pattern: Some("(unclosed".to_string()),
        ..prompt()
    })?;

    editor.complete_rewrite(&ticket.id, Ok("The dog sat.".to_string()))?;
    assert_eq!(editor.doc().plain_text(), "The dog sat.");
    Ok(())
}

#[test]
fn unchanged_output_adds_nothing() -> anyhow::Result<()> {
    let mut editor = Editor::from_paragraphs(["Fine as is."]);
    let ticket = editor.begin_rewrite(prompt())?;

    let applied = editor.complete_rewrite(&ticket.id, Ok("Fine as is.".to_string()))?;
    assert!(applied.edit_ids.is_empty());
    assert!(!applied.fragment.has_edits());
    assert!(!editor.can_undo());
    assert!(editor.decorations().is_empty());
    Ok(())
}

#[test]
fn finished_or_unknown_tickets_are_stale() -> anyhow::Result<()> {
    let mut editor = Editor::from_paragraphs(["The cat sat."]);
    let ticket = editor.begin_rewrite(prompt())?;
    editor.complete_rewrite(&ticket.id, Ok("The dog sat.".to_string()))?;

    assert_eq!(
        editor.complete_rewrite(&ticket.id, Ok("The cow sat.".to_string())),
        Err(EditError::StaleTarget)
    );
    assert_eq!(
        editor.complete_rewrite("nope", Ok(String::new())),
        Err(EditError::StaleTarget)
    );
    assert_eq!(editor.doc().plain_text(), "The dog sat.");
    Ok(())
}

#[test]
fn prompt_spec_loads_from_json_with_defaults() -> anyhow::Result<()> {
    let spec: PromptSpec = serde_json::from_value(serde_json::json!({
        "prompt_text": "Make it shorter.",
        "injection_mode": "paragraph",
    }))?;
    assert_eq!(spec.prompt_text, "Make it shorter.");
    assert_eq!(spec.injection_mode, InjectionMode::Paragraph);
    assert_eq!(spec.temperature, None);
    assert_eq!(spec.output_parsing_pattern, None);

    let spec: PromptSpec = serde_json::from_value(serde_json::json!({}))?;
    assert_eq!(spec.injection_mode, InjectionMode::Selection);
    Ok(())
}

const PIECES: &[&str] = &["a", "b", "cat", "dog", " ", ".", "é", "e\u{301}", "👍🏽", "😀"];

fn random_text(rng: &mut StdRng) -> String {
    let len: usize = rng.gen_range(0..8);
    let mut text = String::new();
    for _ in 0..len {
        text.push_str(PIECES.choose(rng).unwrap());
    }
    text
}

fn assert_canonical_block(editor: &Editor, case: usize) {
    let [Node::Element(block)] = editor.doc().children.as_slice() else {
        panic!("case {case}: expected exactly one paragraph");
    };
    let children = &block.children;
    assert!(
        children.iter().any(|n| matches!(n, Node::Text(_))),
        "case {case}: block has no text leaf"
    );
    for (ix, node) in children.iter().enumerate() {
        match node {
            Node::Text(t) => {
                assert!(
                    t.marks.suggestion.is_none() || !t.text.is_empty(),
                    "case {case}: empty span at {ix}"
                );
                if let Some(Node::Text(next)) = children.get(ix + 1) {
                    assert_ne!(t.marks, next.marks, "case {case}: unmerged leaves at {ix}");
                }
            }
            Node::Void(v) => {
                assert!(
                    v.as_delete_marker()
                        .is_some_and(|m| !m.deleted_text.is_empty()),
                    "case {case}: bad marker at {ix}"
                );
                assert!(
                    ix > 0 && matches!(children[ix - 1], Node::Text(_)),
                    "case {case}: no text before marker at {ix}"
                );
                assert!(
                    matches!(children.get(ix + 1), Some(Node::Text(_))),
                    "case {case}: no text after marker at {ix}"
                );
            }
            Node::Element(_) => panic!("case {case}: nested block at {ix}"),
        }
    }
}

#[test]
fn random_rewrites_stay_canonical_and_round_trip() -> anyhow::Result<()> {
    let mut rng = StdRng::seed_from_u64(0x5eed_cafe);
    for case in 0..300 {
        let old = random_text(&mut rng);
        let new = random_text(&mut rng);

        let mut editor = Editor::from_paragraphs([old.as_str()]);
        let ticket = editor.begin_rewrite(prompt())?;
        let applied = editor.complete_rewrite(&ticket.id, Ok(new.clone()))?;
        assert_canonical_block(&editor, case);
        assert_eq!(editor.doc().plain_text(), new, "case {case}");
        assert_eq!(editor.doc().original_text(), old, "case {case}");
        assert_eq!(editor.edits().len(), applied.edit_ids.len(), "case {case}");
        if applied.edit_ids.is_empty() {
            assert_eq!(old, new, "case {case}");
            continue;
        }

        editor.reject_all_pending()?;
        assert_canonical_block(&editor, case);
        assert_eq!(editor.doc().plain_text(), old, "case {case}");
        assert!(editor.edits().is_empty(), "case {case}");

        assert!(editor.undo());
        assert_eq!(editor.doc().plain_text(), new, "case {case}");
        editor.accept_all_pending()?;
        assert_canonical_block(&editor, case);
        assert_eq!(editor.doc().plain_text(), new, "case {case}");
        assert_eq!(editor.doc().original_text(), new, "case {case}");
        assert!(editor.edits().is_empty(), "case {case}");
    }
    Ok(())
}
