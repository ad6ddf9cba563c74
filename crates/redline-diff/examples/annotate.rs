use redline_diff::{DiffOptions, FragmentNode, build_annotated_fragment, diff_with_options};

fn main() {
    let mut args = std::env::args().skip(1);
    let old = args.next().unwrap_or_else(|| "The cat sat.".to_string());
    let new = args.next().unwrap_or_else(|| "The dog sat.".to_string());

    let ops = diff_with_options(&old, &new, DiffOptions::default());
    println!("ops:");
    for op in &ops {
        println!("  {:?} {:?}", op.tag, op.text);
    }

    let fragment = build_annotated_fragment(&ops);
    println!("fragment ({} edits):", fragment.edit_count());
    for node in &fragment.nodes {
        match node {
            FragmentNode::Text { text } => println!("  text {text:?}"),
            FragmentNode::Span { old_text, new_text } => {
                println!("  span {old_text:?} -> {new_text:?}")
            }
            FragmentNode::DeleteMarker { deleted_text } => println!("  delete {deleted_text:?}"),
            FragmentNode::Placeholder => println!("  placeholder"),
        }
    }
}
