//! Gallery page patching.
//!
//! The gallery page is a static HTML document with one carousel per section:
//!
//! ```html
//! <div class="carousel-slides" id="jun2025-slides">
//!     <!-- Photos will be dynamically added here -->
//! </div>
//! <!-- Next Button -->
//! ...
//! <div class="photo-counter" id="jun2025-counter">1 / 0</div>
//! ```
//!
//! Patching is plain text substitution located by regex, not HTML parsing. Everything outside
//! the matched slide container and counter elements is passed through byte for byte. Both steps
//! are best effort: a missing container or counter leaves that part of the page untouched and
//! is reported in the [`PatchOutcome`] rather than as an error.

use regex::{Captures, Regex};

use crate::config::{GalleryConfig, SectionConfig};

const SLIDE_INDENT: &str = "                            ";
const IMAGE_INDENT: &str = "                                ";
const CONTAINER_INDENT: &str = "                        ";

/// What happened to the slide container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlideInsertion {
    /// The carousel was empty; the new slide was inserted as the active one
    Seeded,
    /// The new slide was appended after the existing slides
    Appended,
    /// The page has no slide container for the section
    SectionNotFound,
    /// The gallery folder has no section
    UnknownFolder,
}

#[derive(Debug, Clone)]
pub struct PatchOutcome {
    pub html: String,
    pub slide: SlideInsertion,
    pub counters_updated: usize,
}

impl PatchOutcome {
    pub fn slide_inserted(&self) -> bool {
        matches!(self.slide, SlideInsertion::Seeded | SlideInsertion::Appended)
    }

    pub fn changed(&self) -> bool {
        self.slide_inserted() || self.counters_updated > 0
    }
}

#[derive(Debug, Clone)]
pub struct PagePatcher {
    site_label: String,
    placeholder_comment: String,
    /// Path from the page back to the bucket root, e.g. `../` for `pages/gallery.html`
    root_prefix: String,
}

impl PagePatcher {
    pub fn new(site_label: impl Into<String>, placeholder_comment: impl Into<String>, page_key: &str) -> Self {
        let depth = page_key.trim_start_matches('/').matches('/').count();
        Self {
            site_label: site_label.into(),
            placeholder_comment: placeholder_comment.into(),
            root_prefix: "../".repeat(depth),
        }
    }

    pub fn from_config(config: &GalleryConfig) -> Self {
        Self::new(&config.site_label, &config.placeholder_comment, &config.page_key)
    }

    /// Insert a slide for `image_key` into `section`'s carousel and bump its counter.
    pub fn patch(&self, page: &str, section: Option<&SectionConfig>, image_key: &str) -> PatchOutcome {
        let Some(section) = section else {
            return PatchOutcome {
                html: page.to_string(),
                slide: SlideInsertion::UnknownFolder,
                counters_updated: 0,
            };
        };

        let (html, slide) = self.insert_slide(page, section, image_key);
        let (html, counters_updated) = bump_counter(html, &section.id);

        PatchOutcome {
            html,
            slide,
            counters_updated,
        }
    }

    fn insert_slide(&self, page: &str, section: &SectionConfig, image_key: &str) -> (String, SlideInsertion) {
        // open: the container's id attribute and `>`
        // lead: whitespace and an optional placeholder comment
        // slides: existing slides, lazily up to the container's closing tag
        // close: the closing tag and the "Next Button" marker comment that follows it
        let pattern = format!(
            r#"(id="{}-slides">)(\s*(?:<!--[^>]*>\s*)?)((?s:.*?))(\s*</div>\s*<!--.*?Next Button)"#,
            regex::escape(&section.id)
        );
        let regex = match Regex::new(&pattern) {
            Ok(regex) => regex,
            Err(e) => {
                tracing::error!(section = %section.id, error = %e, "Failed to build slide container pattern");
                return (page.to_string(), SlideInsertion::SectionNotFound);
            }
        };

        let Some(caps) = regex.captures(page) else {
            return (page.to_string(), SlideInsertion::SectionNotFound);
        };

        let whole = caps.get(0).map_or(0..0, |m| m.range());
        let (open, lead, slides, close) = (&caps[1], &caps[2], &caps[3], &caps[4]);
        let alt = format!("{} - {}", self.site_label, section.title);
        let src = format!("{}{}", self.root_prefix, image_key);

        let existing = slides.trim();
        let (replacement, insertion) = if existing.is_empty() || existing == self.placeholder_comment {
            // The placeholder comment (if any) lives in `lead` or `slides`; both are dropped
            (
                format!("{open}\n{}\n{CONTAINER_INDENT}{}", slide_markup(&src, &alt, true), close.trim_start()),
                SlideInsertion::Seeded,
            )
        } else {
            (
                format!(
                    "{open}{lead}{slides}\n{}\n{CONTAINER_INDENT}{}",
                    slide_markup(&src, &alt, false),
                    close.trim_start()
                ),
                SlideInsertion::Appended,
            )
        };

        let mut html = String::with_capacity(page.len() + replacement.len());
        html.push_str(&page[..whole.start]);
        html.push_str(&replacement);
        html.push_str(&page[whole.end..]);
        (html, insertion)
    }
}

fn slide_markup(src: &str, alt: &str, active: bool) -> String {
    let class = if active { "carousel-slide active" } else { "carousel-slide" };
    format!(
        "{SLIDE_INDENT}<div class=\"{class}\">\n{IMAGE_INDENT}<img src=\"{}\" alt=\"{}\">\n{SLIDE_INDENT}</div>",
        escape_attr(src),
        escape_attr(alt)
    )
}

/// Rewrite every `current / total` counter of the section to `1 / total+1`.
fn bump_counter(html: String, section_id: &str) -> (String, usize) {
    let pattern = format!(
        r#"(<div class="photo-counter" id="{}-counter">)(\d+) / (\d+)(</div>)"#,
        regex::escape(section_id)
    );
    let regex = match Regex::new(&pattern) {
        Ok(regex) => regex,
        Err(e) => {
            tracing::error!(section = section_id, error = %e, "Failed to build counter pattern");
            return (html, 0);
        }
    };

    let mut updated = 0;
    let patched = regex.replace_all(&html, |caps: &Captures| match caps[3].parse::<u64>().ok().and_then(|t| t.checked_add(1)) {
        Some(total) => {
            updated += 1;
            format!("{}1 / {total}{}", &caps[1], &caps[4])
        }
        None => caps[0].to_string(),
    });

    (patched.into_owned(), updated)
}

fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "images/gallery/2025-06/20250614T183205_beach.jpg";

    fn patcher() -> PagePatcher {
        PagePatcher::from_config(&GalleryConfig::default())
    }

    fn june() -> SectionConfig {
        SectionConfig {
            id: "jun2025".to_string(),
            title: "June 2025".to_string(),
        }
    }

    fn page(slides: &str, counter: &str) -> String {
        format!(
            r#"<html>
<body>
    <section class="gallery-section">
        <h2>June 2025</h2>
        <div class="carousel">
            <button class="carousel-btn prev"><!-- Prev Button --></button>
                    <div class="carousel-slides" id="jun2025-slides">
                        {slides}
                    </div>
                    <!-- Next Button -->
            <button class="carousel-btn next">&#10095;</button>
        </div>
        <div class="photo-counter" id="jun2025-counter">{counter}</div>
    </section>
    <section class="gallery-section">
        <div class="carousel-slides" id="oct2025-slides">
            <!-- Photos will be dynamically added here -->
        </div>
        <!-- Next Button -->
        <div class="photo-counter" id="oct2025-counter">1 / 0</div>
    </section>
</body>
</html>
"#
        )
    }

    fn existing_slide(n: usize, active: bool) -> String {
        let class = if active { "carousel-slide active" } else { "carousel-slide" };
        format!("<div class=\"{class}\">\n<img src=\"../images/gallery/2025-06/old_{n}.jpg\" alt=\"old {n}\">\n</div>")
    }

    fn june_slides(html: &str) -> Vec<&str> {
        let start = html.find(r#"id="jun2025-slides">"#).unwrap();
        let end = start + html[start..].find("<!-- Next Button").unwrap();
        html[start..end]
            .match_indices("<div class=\"carousel-slide")
            .map(|(i, _)| {
                let tail = &html[start + i..end];
                &tail[..tail.find("</div>").unwrap()]
            })
            .collect()
    }

    #[test]
    fn test_placeholder_is_replaced_by_active_slide() {
        let input = page("<!-- Photos will be dynamically added here -->", "1 / 0");

        let outcome = patcher().patch(&input, Some(&june()), KEY);

        assert_eq!(outcome.slide, SlideInsertion::Seeded);
        let slides = june_slides(&outcome.html);
        assert_eq!(slides.len(), 1);
        assert!(slides[0].contains(r#"class="carousel-slide active""#));
        assert!(slides[0].contains(&format!(r#"src="../{KEY}""#)));
        assert!(slides[0].contains(r#"alt="Pescara - June 2025""#));

        let june_region = &outcome.html[..outcome.html.find("oct2025-slides").unwrap()];
        assert!(!june_region.contains("Photos will be dynamically added here"));
    }

    #[test]
    fn test_empty_container_is_seeded() {
        let input = page("", "1 / 0");

        let outcome = patcher().patch(&input, Some(&june()), KEY);

        assert_eq!(outcome.slide, SlideInsertion::Seeded);
        assert_eq!(june_slides(&outcome.html).len(), 1);
    }

    #[test]
    fn test_new_slide_is_appended_last() {
        let existing = (0..3).map(|n| existing_slide(n, n == 0)).collect::<Vec<_>>().join("\n");
        let input = page(&existing, "2 / 3");

        let outcome = patcher().patch(&input, Some(&june()), KEY);

        assert_eq!(outcome.slide, SlideInsertion::Appended);
        let slides = june_slides(&outcome.html);
        assert_eq!(slides.len(), 4);
        for n in 0..3 {
            assert!(slides[n].contains(&format!("old_{n}.jpg")), "slide {n} moved: {}", slides[n]);
        }
        assert!(slides[3].contains(KEY));
        assert_eq!(slides.iter().filter(|s| s.contains("carousel-slide active")).count(), 1);
        assert!(slides[0].contains("carousel-slide active"));
        // Existing slides are kept verbatim
        assert!(outcome.html.contains(&existing));
    }

    #[test]
    fn test_counter_resets_current_and_increments_total() {
        let input = page(&existing_slide(0, true), "3 / 5");

        let outcome = patcher().patch(&input, Some(&june()), KEY);

        assert_eq!(outcome.counters_updated, 1);
        assert!(outcome.html.contains(r#"<div class="photo-counter" id="jun2025-counter">1 / 6</div>"#));
        // Other sections keep their counters
        assert!(outcome.html.contains(r#"<div class="photo-counter" id="oct2025-counter">1 / 0</div>"#));
    }

    #[test]
    fn test_unknown_folder_leaves_page_untouched() {
        let input = page("", "1 / 0");

        let outcome = patcher().patch(&input, None, KEY);

        assert_eq!(outcome.slide, SlideInsertion::UnknownFolder);
        assert_eq!(outcome.counters_updated, 0);
        assert!(!outcome.changed());
        assert_eq!(outcome.html, input);
    }

    #[test]
    fn test_missing_container_still_updates_counter() {
        let input = r#"<div class="photo-counter" id="jun2025-counter">4 / 4</div>"#;

        let outcome = patcher().patch(input, Some(&june()), KEY);

        assert_eq!(outcome.slide, SlideInsertion::SectionNotFound);
        assert_eq!(outcome.html, r#"<div class="photo-counter" id="jun2025-counter">1 / 5</div>"#);
    }

    #[test]
    fn test_malformed_counter_is_left_alone() {
        let input = page("", "one of five");

        let outcome = patcher().patch(&input, Some(&june()), KEY);

        assert_eq!(outcome.slide, SlideInsertion::Seeded);
        assert_eq!(outcome.counters_updated, 0);
        assert!(outcome.html.contains(r#"id="jun2025-counter">one of five</div>"#));
    }

    #[test]
    fn test_text_outside_section_is_preserved() {
        let input = page("", "1 / 0");

        let outcome = patcher().patch(&input, Some(&june()), KEY);

        let head = &input[..input.find(r#"id="jun2025-slides">"#).unwrap()];
        let tail = &input[input.find("<!-- Next Button").unwrap()..input.find(r#"id="jun2025-counter""#).unwrap()];
        assert!(outcome.html.starts_with(head));
        assert!(outcome.html.contains(tail));
        assert!(outcome.html.contains("oct2025-slides\">\n            <!-- Photos will be dynamically added here -->"));
    }

    #[test]
    fn test_repeated_appends_do_not_grow_whitespace() {
        let input = page("", "1 / 0");
        let patcher = patcher();

        let once = patcher.patch(&input, Some(&june()), KEY).html;
        let twice = patcher.patch(&once, Some(&june()), "images/gallery/2025-06/b.jpg").html;
        let thrice = patcher.patch(&twice, Some(&june()), "images/gallery/2025-06/c.jpg").html;

        let gap = |html: &str| {
            let end = html.find("<!-- Next Button").unwrap();
            let container_close = html[..end].rfind("</div>").unwrap();
            let last_slide_close = html[..container_close].rfind("</div>").unwrap();
            html[last_slide_close..container_close].len()
        };
        assert_eq!(gap(&twice), gap(&thrice));
        assert_eq!(june_slides(&thrice).len(), 3);
        assert!(thrice.contains(r#"id="jun2025-counter">1 / 3</div>"#));
    }

    #[test]
    fn test_attribute_values_are_escaped() {
        let section = SectionConfig {
            id: "jun2025".to_string(),
            title: "Sun & \"Sea\"".to_string(),
        };

        let outcome = patcher().patch(&page("", "1 / 0"), Some(&section), "images/gallery/2025-06/x_<b>.jpg");

        assert!(outcome.html.contains(r#"alt="Pescara - Sun &amp; &quot;Sea&quot;""#));
        assert!(outcome.html.contains(r#"src="../images/gallery/2025-06/x_&lt;b&gt;.jpg""#));
    }

    #[test]
    fn test_root_prefix_follows_page_depth() {
        let patcher = PagePatcher::new("Site", "<!-- x -->", "a/b/gallery.html");
        let outcome = patcher.patch(&page("", "1 / 0"), Some(&june()), KEY);
        assert!(outcome.html.contains(&format!(r#"src="../../{KEY}""#)));

        let patcher = PagePatcher::new("Site", "<!-- x -->", "index.html");
        let outcome = patcher.patch(&page("", "1 / 0"), Some(&june()), KEY);
        assert!(outcome.html.contains(&format!(r#"src="{KEY}""#)));
    }
}
