use std::fmt::Write as _;

use serde::Deserialize;
use utils::html::{escape, options, paragraphs};

use super::{errors, text_input, textarea, timestamp};

#[derive(Debug, Clone, Deserialize)]
pub struct DocPage {
    #[serde(rename = "_key")]
    pub key: String,
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    /// Slug of the parent page.
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub position: i64,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub updated_at: String,
}

/// Values of the page form, echoed back when it is rejected.
#[derive(Debug, Clone, Default)]
pub struct PageFormValues {
    pub title: String,
    pub content: String,
    pub parent: String,
}

/// Depth-first order: siblings by `position` then title, children after
/// their parent. Pages whose parent is missing are shown at the root.
pub fn tree(pages: &[DocPage]) -> Vec<(usize, &DocPage)> {
    fn children<'a>(pages: &'a [DocPage], parent: Option<&str>) -> Vec<&'a DocPage> {
        let mut list: Vec<&DocPage> = pages
            .iter()
            .filter(|p| match (parent, p.parent.as_deref()) {
                (None, None) => true,
                (None, Some(slug)) => !pages.iter().any(|other| other.slug == slug),
                (Some(want), Some(have)) => want == have,
                (Some(_), None) => false,
            })
            .collect();
        list.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.title.cmp(&b.title)));
        list
    }

    fn walk<'a>(
        pages: &'a [DocPage],
        page: &'a DocPage,
        depth: usize,
        out: &mut Vec<(usize, &'a DocPage)>,
    ) {
        out.push((depth, page));
        for child in children(pages, Some(page.slug.as_str())) {
            walk(pages, child, depth + 1, out);
        }
    }

    let mut out = Vec::with_capacity(pages.len());
    for root in children(pages, None) {
        walk(pages, root, 0, &mut out);
    }
    out
}

pub fn index(pages: &[DocPage]) -> String {
    let mut items = String::new();
    for (depth, page) in tree(pages) {
        let _ = write!(
            items,
            r#"<li class="depth-{depth}"><a href="/docs/{slug}">{title}</a></li>"#,
            slug = escape(&page.slug),
            title = escape(&page.title),
        );
    }
    if items.is_empty() {
        items.push_str(r#"<li class="muted">No pages yet.</li>"#);
    }
    format!(
        r#"<section id="docs">
<h1>Documentation</h1>
<p><a href="/docs/new" class="button">New page</a></p>
<ul class="tree">{items}</ul>
</section>"#
    )
}

pub fn show(page: &DocPage, parent: Option<&DocPage>, children: &[DocPage]) -> String {
    let crumbs = parent
        .map(|p| {
            format!(
                r#"<a href="/docs/{}">{}</a> / "#,
                escape(&p.slug),
                escape(&p.title)
            )
        })
        .unwrap_or_default();
    let sub: String = children
        .iter()
        .map(|c| {
            format!(
                r#"<li><a href="/docs/{}">{}</a></li>"#,
                escape(&c.slug),
                escape(&c.title)
            )
        })
        .collect();
    let sub = if sub.is_empty() {
        String::new()
    } else {
        format!("<h2>Subpages</h2><ul>{sub}</ul>")
    };
    format!(
        r#"<article id="doc">
<nav class="crumbs"><a href="/docs">Docs</a> / {crumbs}</nav>
<h1>{title}</h1>
<p class="muted">Updated {at} by {author}</p>
<div class="content">{content}</div>
{sub}
<div class="actions"><a href="/docs/{slug}/edit" class="button">Edit</a>
<a href="/docs/new?parent={slug}">Add subpage</a>
<button class="danger" hx-delete="/docs/{slug}" hx-confirm="Delete this page?">Delete</button></div>
</article>"#,
        title = escape(&page.title),
        at = escape(&timestamp(&page.updated_at)),
        author = escape(&page.author),
        content = paragraphs(&page.content),
        slug = escape(&page.slug),
    )
}

fn parent_options(pages: &[DocPage], selected: &str, exclude: Option<&str>) -> String {
    let mut out = String::from(r#"<option value="">(top level)</option>"#);
    out.push_str(&options(
        pages
            .iter()
            .filter(|p| Some(p.slug.as_str()) != exclude)
            .map(|p| (p.slug.as_str(), p.title.as_str())),
        Some(selected),
    ));
    out
}

/// New page form, or the edit form when `slug` is set.
pub fn form(
    slug: Option<&str>,
    values: &PageFormValues,
    pages: &[DocPage],
    form_errors: &[String],
) -> String {
    let (heading, attrs) = match slug {
        Some(slug) => (
            "Edit page",
            format!(
                r##"hx-put="/docs/{s}" hx-target="#doc-form" hx-swap="outerHTML""##,
                s = escape(slug)
            ),
        ),
        None => (
            "New page",
            r##"method="post" action="/docs" hx-post="/docs" hx-target="#doc-form" hx-swap="outerHTML""##
                .to_string(),
        ),
    };
    format!(
        r#"<section id="doc-form">
<h1>{heading}</h1>
{errors}
<form {attrs}>
{title}
<label>Parent <select name="parent">{parents}</select></label>
{content}
<button type="submit">Save</button>
</form>
</section>"#,
        errors = errors(form_errors),
        title = text_input("title", "Title", &values.title, "text", true),
        parents = parent_options(pages, &values.parent, slug),
        content = textarea("content", "Content", &values.content),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(slug: &str, title: &str, parent: Option<&str>, position: i64) -> DocPage {
        DocPage {
            key: slug.into(),
            slug: slug.into(),
            title: title.into(),
            content: String::new(),
            parent: parent.map(Into::into),
            position,
            author: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn tree_orders_by_position_then_title() {
        let pages = vec![
            page("b", "Beta", None, 1),
            page("a", "Alpha", None, 1),
            page("z", "Zulu", None, 0),
            page("a-1", "Install", Some("a"), 0),
            page("orphan", "Orphan", Some("gone"), 5),
        ];
        let order: Vec<(usize, &str)> = tree(&pages)
            .into_iter()
            .map(|(d, p)| (d, p.slug.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![(0, "z"), (0, "a"), (1, "a-1"), (0, "b"), (0, "orphan")]
        );
    }
}
