// Node handlers for Markdown serialization.
//
// One handler per Markdown variant. Each takes the serializer state and a
// node and returns a string; block containers join their children with a
// single blank line.

use super::{escape, State};
use crate::error::Error;
use crate::tree::{AlignKind, AstData, Handle};

/// Dispatch to the appropriate handler for a node.
pub(crate) fn handle(state: &mut State, node: &Handle) -> Result<String, Error> {
    let data = node.data.borrow().clone();
    state.path.push(data.kind_name());
    let result = dispatch(state, node, &data);
    state.path.pop();
    result
}

fn dispatch(state: &mut State, node: &Handle, data: &AstData) -> Result<String, Error> {
    match data {
        AstData::Document => {
            if state.path.len() > 1 {
                return Err(state.render_error(node));
            }
            container_flow(state, &node.children_snapshot())
        }
        AstData::Paragraph => {
            state.at_break = true;
            let content = container_phrasing(state, &node.children_snapshot())?;
            state.at_break = false;
            Ok(content)
        }
        AstData::Heading { level } => handle_heading(state, node, *level),
        AstData::ThematicBreak => Ok("---".to_string()),
        AstData::Blockquote => handle_blockquote(state, node),
        AstData::List {
            ordered,
            start,
            tight,
        } => handle_list(state, node, *ordered, *start, *tight),
        AstData::ListItem { .. } => {
            // Reached directly only when a list item is serialized on its
            // own; treat it as an untight flow container.
            list_item_content(state, node, false)
        }
        AstData::CodeBlock { value, lang, meta } => {
            Ok(handle_code(value, lang.as_deref(), meta.as_deref()))
        }
        AstData::Html { value } => Ok(value.clone()),
        AstData::Table { align } => handle_table(state, node, align),
        AstData::TableRow { .. } | AstData::TableCell => {
            // Rendered by the table handler.
            Ok(String::new())
        }
        AstData::Text { value } => Ok(handle_text(state, value)),
        AstData::Emphasis => handle_emphasis(state, node),
        AstData::Strong => {
            let marker = state.options.emphasis;
            let content = container_phrasing(state, &node.children_snapshot())?;
            Ok(format!("{0}{0}{1}{0}{0}", marker, content))
        }
        AstData::Strikethrough => {
            let content = container_phrasing(state, &node.children_snapshot())?;
            Ok(format!("~~{content}~~"))
        }
        AstData::InlineCode { value } => Ok(handle_inline_code(value)),
        AstData::Break { hard } => Ok(if *hard { "  \n" } else { "\n" }.to_string()),
        AstData::Link { url, title } => handle_link(state, node, url, title.as_deref()),
        AstData::Image { url, title, alt } => Ok(handle_image(url, title.as_deref(), alt)),
        AstData::FootnoteDefinition { identifier, label } => {
            handle_footnote_definition(state, node, identifier, label.as_deref())
        }
        AstData::FootnoteReference { identifier, label } => {
            let label = label.as_deref().unwrap_or(identifier.as_str());
            Ok(format!("[^{label}]"))
        }
        AstData::Element { .. } | AstData::Comment { .. } => Err(state.render_error(node)),
    }
}

// ---------------------------------------------------------------------------
// Containers
// ---------------------------------------------------------------------------

/// Serialize block children separated by a single blank line.
pub(crate) fn container_flow(state: &mut State, children: &[Handle]) -> Result<String, Error> {
    let mut parts = Vec::with_capacity(children.len());
    for child in children {
        let content = handle(state, child)?;
        if !content.is_empty() {
            parts.push(content);
        }
    }
    Ok(parts.join("\n\n"))
}

/// Serialize inline children flush together, then resolve whitespace around
/// hard breaks and escape `!` before a following link bracket.
pub(crate) fn container_phrasing(state: &mut State, children: &[Handle]) -> Result<String, Error> {
    let mut parts: Vec<String> = Vec::with_capacity(children.len());
    for child in children {
        parts.push(handle(state, child)?);
    }

    // Trim spaces adjacent to hard breaks: the break itself supplies the
    // trailing double space.
    for i in 0..parts.len() {
        if parts[i] == "  \n" {
            if i > 0 {
                parts[i - 1] = parts[i - 1].trim_end_matches(' ').to_string();
            }
            if i + 1 < parts.len() {
                parts[i + 1] = parts[i + 1].trim_start_matches(' ').to_string();
            }
        }
    }

    // A part ending in unescaped `!` followed by a `[` would read as image
    // syntax; escape the bang.
    for i in 0..parts.len().saturating_sub(1) {
        if parts[i + 1].starts_with('[') && parts[i].ends_with('!') && !parts[i].ends_with("\\!") {
            let len = parts[i].len();
            parts[i].truncate(len - 1);
            parts[i].push_str("\\!");
        }
    }

    Ok(parts.concat())
}

// ---------------------------------------------------------------------------
// Block handlers
// ---------------------------------------------------------------------------

fn handle_heading(state: &mut State, node: &Handle, level: u8) -> Result<String, Error> {
    let content = container_phrasing(state, &node.children_snapshot())?;
    // ATX headings are single-line; breaks inside collapse to spaces.
    let content = content.replace("  \n", " ").replace('\n', " ");
    let hashes = "#".repeat(level.clamp(1, 6) as usize);
    Ok(format!("{hashes} {content}"))
}

fn handle_blockquote(state: &mut State, node: &Handle) -> Result<String, Error> {
    let content = container_flow(state, &node.children_snapshot())?;
    if content.is_empty() {
        return Ok(">".to_string());
    }
    Ok(content
        .lines()
        .map(|line| {
            if line.is_empty() {
                ">".to_string()
            } else {
                format!("> {line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n"))
}

fn handle_list(
    state: &mut State,
    node: &Handle,
    ordered: bool,
    start: Option<u32>,
    tight: bool,
) -> Result<String, Error> {
    let mut rendered = Vec::new();

    for (i, child) in node.children_snapshot().iter().enumerate() {
        let prefix = if ordered {
            format!("{}. ", start.unwrap_or(1) + i as u32)
        } else {
            format!("{} ", state.options.bullet)
        };

        let checked = match &*child.data.borrow() {
            AstData::ListItem { checked } => *checked,
            _ => None,
        };
        let mut content = list_item_content(state, child, tight)?;
        if let Some(checked) = checked {
            let checkbox = if checked { "[x]" } else { "[ ]" };
            content = if content.is_empty() {
                checkbox.to_string()
            } else {
                format!("{checkbox} {content}")
            };
        }

        let indent = " ".repeat(prefix.len());
        let mut lines = content.lines();
        let first = match lines.next() {
            Some(line) if !line.is_empty() => format!("{prefix}{line}"),
            _ => prefix.trim_end().to_string(),
        };
        let mut item = first;
        for line in lines {
            item.push('\n');
            if !line.is_empty() {
                item.push_str(&indent);
                item.push_str(line);
            }
        }
        rendered.push(item);
    }

    let separator = if tight { "\n" } else { "\n\n" };
    Ok(rendered.join(separator))
}

/// Render a list item's flow children, joined tightly or with blank lines.
fn list_item_content(state: &mut State, item: &Handle, tight: bool) -> Result<String, Error> {
    let mut parts = Vec::new();
    for child in item.children_snapshot() {
        let content = handle(state, &child)?;
        if !content.is_empty() {
            parts.push(content);
        }
    }
    Ok(parts.join(if tight { "\n" } else { "\n\n" }))
}

fn handle_code(value: &str, lang: Option<&str>, meta: Option<&str>) -> String {
    // Grow the fence beyond any backtick run that could close it early.
    let content_max = value
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim();
            if !trimmed.is_empty() && trimmed.chars().all(|c| c == '`') {
                Some(trimmed.len())
            } else {
                None
            }
        })
        .max()
        .unwrap_or(0);
    let fence = "`".repeat((content_max + 1).max(3));

    let info = lang.unwrap_or("");
    let meta = meta
        .map(|m| format!(" {}", m.replace('\n', " ")))
        .unwrap_or_default();

    if value.is_empty() {
        format!("{fence}{info}{meta}\n{fence}")
    } else {
        format!("{fence}{info}{meta}\n{value}\n{fence}")
    }
}

fn handle_table(
    state: &mut State,
    node: &Handle,
    align: &[Option<AlignKind>],
) -> Result<String, Error> {
    let mut rows: Vec<Vec<String>> = Vec::new();
    for row in node.children_snapshot() {
        if !matches!(&*row.data.borrow(), AstData::TableRow { .. }) {
            continue;
        }
        let mut cells = Vec::new();
        for cell in row.children_snapshot() {
            if !matches!(&*cell.data.borrow(), AstData::TableCell) {
                continue;
            }
            cells.push(cell_content(state, &cell)?);
        }
        rows.push(cells);
    }
    if rows.is_empty() {
        return Ok(String::new());
    }

    let col_count = rows.iter().map(Vec::len).max().unwrap_or(0).max(1);
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(format_row(&rows[0], col_count));

    let separator: Vec<&str> = (0..col_count)
        .map(|i| match align.get(i).copied().flatten() {
            Some(AlignKind::Left) => ":---",
            Some(AlignKind::Right) => "---:",
            Some(AlignKind::Center) => ":---:",
            None => "---",
        })
        .collect();
    lines.push(format!("| {} |", separator.join(" | ")));

    for row in rows.iter().skip(1) {
        lines.push(format_row(row, col_count));
    }
    Ok(lines.join("\n"))
}

fn cell_content(state: &mut State, cell: &Handle) -> Result<String, Error> {
    state.in_table_cell = true;
    let children = cell.children_snapshot();
    let result = if children.iter().all(|c| c.is_phrasing()) {
        container_phrasing(state, &children)
    } else {
        // Block content inside a cell flattens to space-joined inline text.
        let mut parts = Vec::new();
        for child in &children {
            let content = handle(state, child)?;
            if !content.is_empty() {
                parts.push(content);
            }
        }
        Ok(parts.join(" "))
    };
    state.in_table_cell = false;
    let content = result?;
    Ok(content.trim().replace("  \n", " ").replace('\n', " "))
}

fn format_row(cells: &[String], col_count: usize) -> String {
    let padded: Vec<&str> = (0..col_count)
        .map(|i| cells.get(i).map(String::as_str).unwrap_or(""))
        .collect();
    format!("| {} |", padded.join(" | "))
}

fn handle_footnote_definition(
    state: &mut State,
    node: &Handle,
    identifier: &str,
    label: Option<&str>,
) -> Result<String, Error> {
    let label = label.unwrap_or(identifier);
    let content = container_flow(state, &node.children_snapshot())?;
    let indented: Vec<String> = content
        .lines()
        .enumerate()
        .map(|(i, line)| {
            if i == 0 || line.is_empty() {
                line.to_string()
            } else {
                format!("    {line}")
            }
        })
        .collect();
    Ok(format!("[^{label}]: {}", indented.join("\n")))
}

// ---------------------------------------------------------------------------
// Inline handlers
// ---------------------------------------------------------------------------

fn handle_text(state: &mut State, value: &str) -> String {
    let escaped = escape::escape_text(value, state.in_link_text);
    let escaped = if state.in_table_cell {
        escaped.replace('|', "\\|")
    } else {
        escaped
    };
    if state.at_break {
        state.at_break = false;
        escape::escape_at_break_start(escaped)
    } else {
        escaped
    }
}

fn handle_emphasis(state: &mut State, node: &Handle) -> Result<String, Error> {
    let marker = state.options.emphasis;
    let content = container_phrasing(state, &node.children_snapshot())?;
    // If the content starts or ends with a single instance of the marker
    // (an inner emphasis span), wrapping with the same marker would read as
    // strong; switch to the alternate delimiter.
    let m = marker as u8;
    let bytes = content.as_bytes();
    let starts_single = bytes.first() == Some(&m) && bytes.get(1) != Some(&m);
    let ends_single =
        bytes.last() == Some(&m) && bytes.len() >= 2 && bytes[bytes.len() - 2] != m;
    let marker = if starts_single || ends_single {
        if marker == '*' {
            '_'
        } else {
            '*'
        }
    } else {
        marker
    };
    Ok(format!("{marker}{content}{marker}"))
}

fn handle_inline_code(value: &str) -> String {
    // A newline inside inline code can trigger block constructs when
    // re-parsed; flatten to spaces.
    let value = value.replace('\n', " ");

    let max_run = longest_backtick_run(&value);
    let ticks = "`".repeat(max_run + 1);

    let needs_space = value.starts_with('`')
        || value.ends_with('`')
        || (value.starts_with(' ') && value.ends_with(' ') && !value.trim().is_empty());
    if needs_space {
        format!("{ticks} {value} {ticks}")
    } else {
        format!("{ticks}{value}{ticks}")
    }
}

fn handle_link(
    state: &mut State,
    node: &Handle,
    url: &str,
    title: Option<&str>,
) -> Result<String, Error> {
    state.in_link_text = true;
    let content = container_phrasing(state, &node.children_snapshot())?;
    state.in_link_text = false;
    let content = content.trim_start();

    let url = format_link_url(url);
    Ok(match title {
        Some(title) => format!("[{content}]({url} \"{}\")", escape_link_title(title)),
        None => format!("[{content}]({url})"),
    })
}

fn handle_image(url: &str, title: Option<&str>, alt: &str) -> String {
    let alt = escape::escape_text(alt, true);
    let url = format_link_url(url);
    match title {
        Some(title) => format!("![{alt}]({url} \"{}\")", escape_link_title(title)),
        None => format!("![{alt}]({url})"),
    }
}

/// Escape `\` and `"` in link/image titles. Backslash first, so the escapes
/// introduced for `"` are not doubled.
fn escape_link_title(title: &str) -> String {
    title.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Wrap a link destination in `<…>` when a bare form would be misparsed:
/// unbalanced `)`, embedded whitespace, or angle brackets.
fn format_link_url(url: &str) -> String {
    if link_url_needs_angle_brackets(url) {
        format!("<{url}>")
    } else {
        url.to_string()
    }
}

fn link_url_needs_angle_brackets(url: &str) -> bool {
    let mut depth: i32 = 0;
    for c in url.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return true;
                }
            }
            ' ' | '\t' | '\n' | '<' | '>' => return true,
            _ => {}
        }
    }
    depth != 0
}

/// Find the longest consecutive run of backticks in a string.
fn longest_backtick_run(s: &str) -> usize {
    let mut max = 0;
    let mut current = 0;
    for c in s.chars() {
        if c == '`' {
            current += 1;
            max = max.max(current);
        } else {
            current = 0;
        }
    }
    max
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialize::{serialize, SerializeOptions};
    use crate::tree::{text, AstNode};
    use pretty_assertions::assert_eq;

    fn doc(children: Vec<Handle>) -> Handle {
        AstNode::new_with_children(AstData::Document, children)
    }

    fn md(root: &Handle) -> String {
        serialize(root, &SerializeOptions::default()).unwrap()
    }

    #[test]
    fn heading_is_atx() {
        let root = doc(vec![AstNode::new_with_children(
            AstData::Heading { level: 1 },
            vec![text("Test Heading")],
        )]);
        assert_eq!(md(&root), "# Test Heading\n");
    }

    #[test]
    fn blockquote_prefixes_every_line() {
        let inner = AstNode::new_with_children(
            AstData::Blockquote,
            vec![AstNode::new_with_children(
                AstData::Paragraph,
                vec![text("B")],
            )],
        );
        let root = doc(vec![AstNode::new_with_children(
            AstData::Blockquote,
            vec![
                AstNode::new_with_children(AstData::Paragraph, vec![text("A")]),
                inner,
            ],
        )]);
        assert_eq!(md(&root), "> A\n>\n> > B\n");
    }

    #[test]
    fn ordered_list_counts_from_start() {
        let items = vec![
            AstNode::new_with_children(
                AstData::ListItem { checked: None },
                vec![AstNode::new_with_children(
                    AstData::Paragraph,
                    vec![text("A")],
                )],
            ),
            AstNode::new_with_children(
                AstData::ListItem { checked: None },
                vec![AstNode::new_with_children(
                    AstData::Paragraph,
                    vec![text("B")],
                )],
            ),
        ];
        let root = doc(vec![AstNode::new_with_children(
            AstData::List {
                ordered: true,
                start: Some(3),
                tight: true,
            },
            items,
        )]);
        assert_eq!(md(&root), "3. A\n4. B\n");
    }

    #[test]
    fn task_items_render_checkboxes() {
        let items = vec![
            AstNode::new_with_children(
                AstData::ListItem {
                    checked: Some(true),
                },
                vec![AstNode::new_with_children(
                    AstData::Paragraph,
                    vec![text("done")],
                )],
            ),
            AstNode::new_with_children(
                AstData::ListItem {
                    checked: Some(false),
                },
                vec![AstNode::new_with_children(
                    AstData::Paragraph,
                    vec![text("open")],
                )],
            ),
        ];
        let root = doc(vec![AstNode::new_with_children(
            AstData::List {
                ordered: false,
                start: None,
                tight: true,
            },
            items,
        )]);
        assert_eq!(md(&root), "- [x] done\n- [ ] open\n");
    }

    #[test]
    fn code_block_with_language() {
        let root = doc(vec![AstNode::new(AstData::CodeBlock {
            value: "function x(){}".into(),
            lang: Some("javascript".into()),
            meta: None,
        })]);
        assert_eq!(md(&root), "```javascript\nfunction x(){}\n```\n");
    }

    #[test]
    fn code_fence_grows_past_backtick_runs() {
        let root = doc(vec![AstNode::new(AstData::CodeBlock {
            value: "```\ninner\n```".into(),
            lang: None,
            meta: None,
        })]);
        let output = md(&root);
        assert!(output.starts_with("````\n"));
        assert!(output.ends_with("````\n"));
    }

    #[test]
    fn table_is_compact_pipes() {
        let header = AstNode::new_with_children(
            AstData::TableRow { is_header: true },
            vec![
                AstNode::new_with_children(AstData::TableCell, vec![text("Header 1")]),
                AstNode::new_with_children(AstData::TableCell, vec![text("Header 2")]),
            ],
        );
        let data = AstNode::new_with_children(
            AstData::TableRow { is_header: false },
            vec![
                AstNode::new_with_children(AstData::TableCell, vec![text("a")]),
                AstNode::new_with_children(AstData::TableCell, vec![text("b")]),
            ],
        );
        let root = doc(vec![AstNode::new_with_children(
            AstData::Table {
                align: vec![None, None],
            },
            vec![header, data],
        )]);
        assert_eq!(
            md(&root),
            "| Header 1 | Header 2 |\n| --- | --- |\n| a | b |\n"
        );
    }

    #[test]
    fn table_alignment_marks() {
        let header = AstNode::new_with_children(
            AstData::TableRow { is_header: true },
            vec![
                AstNode::new_with_children(AstData::TableCell, vec![text("L")]),
                AstNode::new_with_children(AstData::TableCell, vec![text("C")]),
                AstNode::new_with_children(AstData::TableCell, vec![text("R")]),
            ],
        );
        let root = doc(vec![AstNode::new_with_children(
            AstData::Table {
                align: vec![
                    Some(AlignKind::Left),
                    Some(AlignKind::Center),
                    Some(AlignKind::Right),
                ],
            },
            vec![header],
        )]);
        assert_eq!(md(&root), "| L | C | R |\n| :--- | :---: | ---: |\n");
    }

    #[test]
    fn pipes_in_cells_are_escaped() {
        let header = AstNode::new_with_children(
            AstData::TableRow { is_header: true },
            vec![AstNode::new_with_children(
                AstData::TableCell,
                vec![text("a|b")],
            )],
        );
        let root = doc(vec![AstNode::new_with_children(
            AstData::Table { align: vec![None] },
            vec![header],
        )]);
        assert!(md(&root).contains("a\\|b"));
    }

    #[test]
    fn emphasis_switches_marker_against_inner_emphasis() {
        let inner = AstNode::new_with_children(AstData::Emphasis, vec![text("x")]);
        let root = doc(vec![AstNode::new_with_children(
            AstData::Paragraph,
            vec![AstNode::new_with_children(AstData::Emphasis, vec![inner])],
        )]);
        assert_eq!(md(&root), "_*x*_\n");
    }

    #[test]
    fn inline_code_with_backticks_pads_and_grows() {
        assert_eq!(handle_inline_code("a`b"), "``a`b``");
        assert_eq!(handle_inline_code("`edge"), "`` `edge ``");
        assert_eq!(handle_inline_code("plain"), "`plain`");
    }

    #[test]
    fn hard_break_renders_two_spaces() {
        let root = doc(vec![AstNode::new_with_children(
            AstData::Paragraph,
            vec![
                text("a"),
                AstNode::new(AstData::Break { hard: true }),
                text("b"),
            ],
        )]);
        assert_eq!(md(&root), "a  \nb\n");
    }

    #[test]
    fn link_with_title_and_space_url() {
        let link = AstNode::new_with_children(
            AstData::Link {
                url: "/a b".into(),
                title: Some("say \"hi\"".into()),
            },
            vec![text("x")],
        );
        let root = doc(vec![AstNode::new_with_children(
            AstData::Paragraph,
            vec![link],
        )]);
        assert_eq!(md(&root), "[x](</a b> \"say \\\"hi\\\"\")\n");
    }

    #[test]
    fn image_with_alt_and_url() {
        let root = doc(vec![AstNode::new_with_children(
            AstData::Paragraph,
            vec![AstNode::new(AstData::Image {
                url: "image.jpg".into(),
                title: None,
                alt: "Alt Text".into(),
            })],
        )]);
        assert_eq!(md(&root), "![Alt Text](image.jpg)\n");
    }

    #[test]
    fn footnotes_render_reference_and_definition() {
        let root = doc(vec![
            AstNode::new_with_children(
                AstData::Paragraph,
                vec![
                    text("claim"),
                    AstNode::new(AstData::FootnoteReference {
                        identifier: "1".into(),
                        label: Some("1".into()),
                    }),
                ],
            ),
            AstNode::new_with_children(
                AstData::FootnoteDefinition {
                    identifier: "1".into(),
                    label: Some("1".into()),
                },
                vec![AstNode::new_with_children(
                    AstData::Paragraph,
                    vec![text("the note")],
                )],
            ),
        ]);
        let output = md(&root);
        assert!(output.contains("claim[^1]"));
        assert!(output.contains("[^1]: the note"));
    }
}
