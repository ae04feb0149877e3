use scraper::node::Node;
use scraper::ElementRef;

/// Elements that start and end their own line of rendered text.
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "button", "dd", "div", "dl", "dt",
    "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6",
    "header", "hr", "li", "main", "nav", "ol", "p", "pre", "section", "table", "td",
    "th", "tr", "ul",
];

const SKIPPED_TAGS: &[&str] = &["script", "style", "template", "noscript"];

#[derive(Default)]
struct Lines {
    done: Vec<String>,
    current: String,
    pending_space: bool,
}

impl Lines {
    fn push_text(&mut self, text: &str) {
        if text.starts_with(char::is_whitespace) {
            self.pending_space = true;
        }
        for (i, word) in text.split_whitespace().enumerate() {
            if i > 0 {
                self.pending_space = true;
            }
            if self.pending_space && !self.current.is_empty() {
                self.current.push(' ');
            }
            self.current.push_str(word);
            self.pending_space = false;
        }
        if text.ends_with(char::is_whitespace) {
            self.pending_space = true;
        }
    }

    fn break_line(&mut self) {
        if !self.current.is_empty() {
            self.done.push(std::mem::take(&mut self.current));
        }
        self.pending_space = false;
    }
}

/// Approximate a browser's visible text for `el`: runs of whitespace collapse
/// to one space, block elements and `<br>` break lines, empty lines vanish.
pub fn rendered_text(el: ElementRef<'_>) -> String {
    let mut lines = Lines::default();
    walk(el, &mut lines);
    lines.break_line();
    lines.done.join("\n")
}

fn walk(el: ElementRef<'_>, lines: &mut Lines) {
    for child in el.children() {
        match child.value() {
            Node::Text(t) => lines.push_text(&**t),
            Node::Element(e) => {
                let name = e.name();
                if SKIPPED_TAGS.contains(&name) {
                    continue;
                }
                if name == "br" {
                    lines.break_line();
                    continue;
                }
                let Some(child_el) = ElementRef::wrap(child) else {
                    continue;
                };
                let block = BLOCK_TAGS.contains(&name);
                if block {
                    lines.break_line();
                }
                walk(child_el, lines);
                if block {
                    lines.break_line();
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::{Html, Selector};

    fn text_of(html: &str) -> String {
        let doc = Html::parse_fragment(html);
        let sel = Selector::parse("#t").unwrap();
        rendered_text(doc.select(&sel).next().unwrap())
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(text_of("<p id=t>  one \n\t two  </p>"), "one two");
    }

    #[test]
    fn inline_elements_stay_on_one_line() {
        assert_eq!(text_of("<span id=t>Comments (<b>42</b>)</span>"), "Comments (42)");
        assert_eq!(text_of("<span id=t>A <i>b</i> c</span>"), "A b c");
    }

    #[test]
    fn blocks_break_lines() {
        let html = "<div id=t><button>Tags</button><ul><li></li><li><a>AI</a></li>\
                    <li> Privacy </li></ul><button>Close</button></div>";
        assert_eq!(text_of(html), "Tags\nAI\nPrivacy\nClose");
    }

    #[test]
    fn br_and_scripts() {
        assert_eq!(
            text_of("<p id=t>a<br>b<script>var x = 1;</script></p>"),
            "a\nb"
        );
    }
}
