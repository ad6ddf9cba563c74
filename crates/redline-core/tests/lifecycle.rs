use redline_core::{
    ApplyError, AttrPatch, Attrs, BulkOutcome, Document, EditError, EditKind, Editor, Marks, Node,
    Op, PluginRegistry, Point, Selection, SuggestionMark, TextNode, Transaction,
};

fn editor_with(blocks: Vec<Vec<Node>>) -> Editor {
    let doc = Document {
        children: blocks.into_iter().map(Node::paragraph_with).collect(),
    };
    let selection = Selection::collapsed(Point::new(vec![0, 0], 0));
    Editor::new(doc, selection, PluginRegistry::core())
}

fn cat_to_dog() -> Editor {
    editor_with(vec![vec![
        Node::text("The "),
        Node::suggestion("s1", "cat", "dog"),
        Node::text(" sat."),
    ]])
}

fn hello_world() -> Editor {
    editor_with(vec![vec![
        Node::text("Hello"),
        Node::delete_marker("m1", " world"),
        Node::text(""),
    ]])
}

fn new_sentence() -> Editor {
    editor_with(vec![vec![
        Node::suggestion("a1", "", "New sentence"),
        Node::text(""),
    ]])
}

fn mixed() -> Editor {
    editor_with(vec![vec![
        Node::text("The "),
        Node::suggestion("s1", "cat", "dog"),
        Node::text(" sat"),
        Node::delete_marker("m1", " quietly"),
        Node::text("."),
        Node::suggestion("a1", "", " Then it left."),
        Node::text(""),
    ]])
}

#[test]
fn seeded_documents_are_already_canonical() {
    for editor in [cat_to_dog(), hello_world(), new_sentence(), mixed()] {
        assert!(!editor.can_undo());
        assert!(!editor.has_pending_events());
    }
    assert_eq!(mixed().doc().children.len(), 1);
    assert_eq!(mixed().edits().len(), 3);
}

#[test]
fn replace_span_accept_and_reject() {
    let mut editor = cat_to_dog();
    assert_eq!(editor.doc().plain_text(), "The dog sat.");
    assert_eq!(editor.doc().original_text(), "The cat sat.");
    let entry = editor.edits().get("s1").unwrap();
    assert_eq!(entry.kind, EditKind::Replace);
    assert_eq!(entry.old_text, "cat");
    assert_eq!(entry.new_text, "dog");

    editor.accept_edit("s1").unwrap();
    assert_eq!(editor.doc().children, vec![Node::paragraph("The dog sat.")]);
    assert_eq!(editor.selection().focus, Point::new(vec![0, 0], 7));

    let mut editor = cat_to_dog();
    editor.reject_edit("s1").unwrap();
    assert_eq!(editor.doc().children, vec![Node::paragraph("The cat sat.")]);
    assert!(editor.edits().is_empty());
}

#[test]
fn delete_marker_accept_and_reject() {
    let mut editor = hello_world();
    assert_eq!(editor.doc().plain_text(), "Hello");
    let entry = editor.edits().get("m1").unwrap();
    assert_eq!(entry.kind, EditKind::Delete);
    assert_eq!(entry.old_text, " world");
    assert_eq!(entry.new_text, "");

    editor.accept_edit("m1").unwrap();
    assert_eq!(editor.doc().children, vec![Node::paragraph("Hello")]);
    assert_eq!(editor.selection().focus, Point::new(vec![0, 0], 5));

    let mut editor = hello_world();
    editor.reject_edit("m1").unwrap();
    assert_eq!(editor.doc().children, vec![Node::paragraph("Hello world")]);
    assert_eq!(editor.selection().focus, Point::new(vec![0, 0], 11));
}

#[test]
fn add_span_accept_and_reject() {
    let mut editor = new_sentence();
    assert_eq!(editor.edits().get("a1").unwrap().kind, EditKind::Add);

    editor.accept_edit("a1").unwrap();
    assert_eq!(editor.doc().children, vec![Node::paragraph("New sentence")]);

    let mut editor = new_sentence();
    editor.reject_edit("a1").unwrap();
    assert_eq!(editor.doc().children, vec![Node::paragraph("")]);
    assert!(editor.edits().is_empty());
}

#[test]
fn reject_all_restores_the_original_text() {
    let mut editor = mixed();
    let original = editor.doc().original_text();
    assert_eq!(original, "The cat sat quietly.");

    let outcome = editor.reject_all_pending().unwrap();
    assert_eq!(outcome.resolved, vec!["s1", "m1", "a1"]);
    assert!(outcome.missing.is_empty());
    assert_eq!(editor.doc().plain_text(), original);
    assert_eq!(editor.doc().children, vec![Node::paragraph(original)]);
    assert!(editor.edits().is_empty());
}

#[test]
fn accept_all_keeps_the_proposed_text() {
    let mut editor = mixed();
    let proposed = editor.doc().plain_text();
    assert_eq!(proposed, "The dog sat. Then it left.");

    editor.accept_all_pending().unwrap();
    assert_eq!(editor.doc().children, vec![Node::paragraph(proposed)]);
}

#[test]
fn bulk_resolution_is_one_undo_step() {
    let mut editor = mixed();
    let before = editor.doc().clone();

    editor.reject_all(&["s1", "m1", "a1"]).unwrap();
    assert!(editor.edits().is_empty());

    assert!(editor.undo());
    assert_eq!(editor.doc(), &before);
    assert_eq!(editor.edits().len(), 3);
    assert!(!editor.can_undo());
}

#[test]
fn missing_ids_are_reported_and_skipped() {
    let mut editor = mixed();

    let outcome = editor.accept_all(&["s1", "gone"]).unwrap();
    assert_eq!(
        outcome,
        BulkOutcome {
            resolved: vec!["s1".to_string()],
            missing: vec!["gone".to_string()],
        }
    );
    assert_eq!(editor.edits().ids(), vec!["m1", "a1"]);

    let doc_before = editor.doc().clone();
    assert_eq!(
        editor.accept_edit("s1"),
        Err(EditError::EditNotFound {
            id: "s1".to_string()
        })
    );
    assert!(matches!(
        editor.reject_all(&["gone", "s1"]),
        Err(EditError::EditNotFound { .. })
    ));
    assert_eq!(editor.doc(), &doc_before);
}

#[test]
fn empty_bulk_request_is_a_no_op() {
    let mut editor = mixed();
    let no_ids: [&str; 0] = [];
    assert_eq!(editor.accept_all(&no_ids).unwrap(), BulkOutcome::default());
    assert!(!editor.can_undo());
    assert_eq!(editor.edits().len(), 3);
}

#[test]
fn resolving_in_selection_only_touches_selected_edits() {
    let mut editor = editor_with(vec![
        vec![
            Node::text("One "),
            Node::suggestion("x", "two", "2"),
            Node::text("."),
        ],
        vec![
            Node::text("Three "),
            Node::suggestion("y", "four", "4"),
            Node::text("."),
        ],
    ]);
    editor.set_selection(Selection::new(
        Point::new(vec![0, 0], 0),
        Point::new(vec![0, 2], 1),
    ));

    let outcome = editor.accept_in_selection().unwrap();
    assert_eq!(outcome.resolved, vec!["x"]);
    assert_eq!(editor.doc().plain_text(), "One 2.\nThree 4.");
    assert_eq!(editor.edits().ids(), vec!["y"]);
    assert_eq!(editor.doc().original_text(), "One 2.\nThree four.");
}

#[test]
fn span_continued_in_another_leaf_restores_old_text_once() {
    let bold = redline_core::Marks {
        bold: true,
        suggestion: Some(redline_core::SuggestionMark {
            id: "s1".to_string(),
            old_text: "cat".to_string(),
        }),
        ..Default::default()
    };
    let mut editor = editor_with(vec![vec![
        Node::text("The "),
        Node::suggestion("s1", "cat", "d"),
        Node::Text(redline_core::TextNode {
            text: "og".to_string(),
            marks: bold,
        }),
        Node::text(" sat."),
    ]]);
    let entry = editor.edits().get("s1").unwrap();
    assert_eq!(entry.new_text, "dog");
    assert_eq!(entry.segments.len(), 1);

    editor.reject_edit("s1").unwrap();
    assert_eq!(editor.doc().plain_text(), "The cat sat.");
}

#[test]
fn ops_cannot_rewrite_a_pending_edit() {
    let mut editor = cat_to_dog();
    for marks in [
        Marks {
            suggestion: Some(SuggestionMark {
                id: "s1".to_string(),
                old_text: "cow".to_string(),
            }),
            ..Marks::default()
        },
        Marks::default(),
    ] {
        let err = editor
            .apply(Transaction::new(vec![Op::SetTextMarks {
                path: vec![0, 1],
                marks,
            }]))
            .unwrap_err();
        assert!(matches!(err, ApplyError::PendingEdit(_)), "{err}");
    }
    let err = editor
        .apply(Transaction::new(vec![Op::SetTextMarks {
            path: vec![0, 0],
            marks: Marks {
                suggestion: Some(SuggestionMark {
                    id: "forged".to_string(),
                    old_text: "A".to_string(),
                }),
                ..Marks::default()
            },
        }]))
        .unwrap_err();
    assert!(matches!(err, ApplyError::PendingEdit(_)), "{err}");
    assert_eq!(editor.edits().ids(), vec!["s1"]);
    assert!(!editor.can_undo());

    editor.reject_edit("s1").unwrap();
    assert_eq!(editor.doc().plain_text(), "The cat sat.");

    let mut editor = hello_world();
    let set: Attrs = [("deleted_text".to_string(), serde_json::json!(""))]
        .into_iter()
        .collect();
    let err = editor
        .apply(Transaction::new(vec![Op::SetNodeAttrs {
            path: vec![0, 1],
            patch: AttrPatch {
                set,
                remove: Vec::new(),
            },
        }]))
        .unwrap_err();
    assert!(matches!(err, ApplyError::PendingEdit(_)), "{err}");
    assert_eq!(editor.edits().get("m1").unwrap().old_text, " world");
}

#[test]
fn formatting_a_span_keeps_it_pending() {
    let mut editor = cat_to_dog();
    let formatted = Marks {
        bold: true,
        underline: true,
        suggestion: Some(SuggestionMark {
            id: "s1".to_string(),
            old_text: "cat".to_string(),
        }),
        ..Marks::default()
    };
    editor
        .apply(Transaction::new(vec![Op::SetTextMarks {
            path: vec![0, 1],
            marks: formatted.clone(),
        }]))
        .unwrap();
    let entry = editor.edits().get("s1").unwrap();
    assert_eq!(entry.old_text, "cat");
    assert_eq!(entry.new_text, "dog");

    assert!(editor.undo());
    assert!(editor.redo());
    editor.reject_edit("s1").unwrap();
    assert_eq!(
        editor.doc().children,
        vec![Node::paragraph_with(vec![
            Node::text("The "),
            Node::Text(TextNode {
                text: "cat".to_string(),
                marks: formatted.without_suggestion(),
            }),
            Node::text(" sat."),
        ])]
    );
}
