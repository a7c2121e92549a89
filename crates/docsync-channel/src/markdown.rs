use serde::{Deserialize, Serialize};

use crate::client::Video;

const SLUG_MAX_LEN: usize = 50;
const DESCRIPTION_MAX_LEN: usize = 200;

pub const INDEX_FILE: &str = "videos.json";

/// Aggregate `videos.json` written next to the per-video files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoIndex {
    pub last_sync: String,
    pub total_videos: usize,
    pub channel_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    pub videos: Vec<IndexEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    pub id: String,
    pub title: String,
    pub published_at: String,
    pub file: String,
    pub has_transcript: bool,
}

pub fn watch_url(video_id: &str) -> String {
    format!("https://youtube.com/watch?v={video_id}")
}

/// `<id>-<slug>.md`, or `<id>.md` when the title has nothing sluggable.
pub fn file_name(video: &Video) -> String {
    let slug = slugify(&video.title);
    if slug.is_empty() {
        format!("{}.md", video.id)
    } else {
        format!("{}-{slug}.md", video.id)
    }
}

/// Lowercase ASCII slug: accents folded, runs of anything else collapsed
/// to `-`, capped at 50 characters.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;

    for c in text.to_lowercase().chars() {
        if is_combining_mark(c) {
            continue;
        }
        let c = fold_accent(c).unwrap_or(c);
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }

    slug.truncate(SLUG_MAX_LEN);
    slug.trim_end_matches('-').to_owned()
}

fn is_combining_mark(c: char) -> bool {
    ('\u{0300}'..='\u{036f}').contains(&c)
}

/// Base letter for precomposed Latin characters that decompose into a
/// letter plus combining marks.
fn fold_accent(c: char) -> Option<char> {
    let base = match c {
        'à'..='å' | 'ā' | 'ă' | 'ą' => 'a',
        'ç' | 'ć' | 'ĉ' | 'ċ' | 'č' => 'c',
        'ď' => 'd',
        'è'..='ë' | 'ē' | 'ĕ' | 'ė' | 'ę' | 'ě' => 'e',
        'ĝ' | 'ğ' | 'ġ' | 'ģ' => 'g',
        'ĥ' => 'h',
        'ì'..='ï' | 'ĩ' | 'ī' | 'ĭ' | 'į' => 'i',
        'ĵ' => 'j',
        'ķ' => 'k',
        'ĺ' | 'ļ' | 'ľ' => 'l',
        'ñ' | 'ń' | 'ņ' | 'ň' => 'n',
        'ò'..='ö' | 'ō' | 'ŏ' | 'ő' => 'o',
        'ŕ' | 'ŗ' | 'ř' => 'r',
        'ś' | 'ŝ' | 'ş' | 'š' => 's',
        'ţ' | 'ť' => 't',
        'ù'..='ü' | 'ũ' | 'ū' | 'ŭ' | 'ů' | 'ű' | 'ų' => 'u',
        'ŵ' => 'w',
        'ý' | 'ÿ' | 'ŷ' => 'y',
        'ź' | 'ż' | 'ž' => 'z',
        _ => return None,
    };
    Some(base)
}

/// Double-quoted YAML scalar on a single line.
fn yaml_quote(text: &str) -> String {
    let escaped = text
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace(['\r', '\n'], " ");
    format!("\"{escaped}\"")
}

/// "January 5, 2025"; falls back to the raw timestamp when it does not parse.
pub fn display_date(published_at: &str) -> String {
    chrono::DateTime::parse_from_rfc3339(published_at)
        .map(|d| d.format("%B %-d, %Y").to_string())
        .unwrap_or_else(|_| published_at.to_owned())
}

/// One video as a markdown document with front matter.
pub fn render_video(video: &Video, transcript: Option<&str>) -> String {
    let short_description: String = video
        .description
        .chars()
        .take(DESCRIPTION_MAX_LEN)
        .collect();
    let url = watch_url(&video.id);

    let mut doc = String::new();
    doc.push_str("---\n");
    doc.push_str(&format!("title: {}\n", yaml_quote(&video.title)));
    doc.push_str(&format!("description: {}\n", yaml_quote(&short_description)));
    doc.push_str(&format!("videoId: {}\n", yaml_quote(&video.id)));
    doc.push_str(&format!("publishedAt: {}\n", yaml_quote(&video.published_at)));
    doc.push_str(&format!("url: {}\n", yaml_quote(&url)));
    doc.push_str(&format!("hasTranscript: {}\n", transcript.is_some()));
    doc.push_str("---\n\n");

    doc.push_str(&format!("# {}\n\n", video.title));
    doc.push_str(&format!("> Published on {}\n\n", display_date(&video.published_at)));
    doc.push_str(&format!("## Description\n\n{}\n\n", video.description));
    doc.push_str(&format!("## Watch on YouTube\n\n[Watch this video]({url})\n\n"));

    match transcript {
        Some(text) => doc.push_str(&format!("## Transcript\n\n{text}\n")),
        None => doc.push_str("⚠️ No transcript available for this video\n"),
    }
    doc
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(title: &str, description: &str) -> Video {
        Video {
            id: "abc123".into(),
            title: title.into(),
            description: description.into(),
            published_at: "2025-01-05T16:00:00Z".into(),
        }
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct FrontMatter {
        title: String,
        description: String,
        video_id: String,
        url: String,
        has_transcript: bool,
    }

    fn front_matter(doc: &str) -> FrontMatter {
        let body = doc.strip_prefix("---\n").unwrap();
        let (yaml, _) = body.split_once("\n---\n").unwrap();
        serde_yaml_ng::from_str(yaml).unwrap()
    }

    #[test]
    fn slugify_folds_accents_and_collapses_separators() {
        assert_eq!(slugify("Héllo, Wörld!"), "hello-world");
        assert_eq!(slugify("  --Nuxt 4: What's New?--  "), "nuxt-4-what-s-new");
        assert_eq!(slugify("Crème brûlée"), "creme-brulee");
    }

    #[test]
    fn slugify_strips_decomposed_marks() {
        assert_eq!(slugify("Cafe\u{0301} Talk"), "cafe-talk");
    }

    #[test]
    fn slugify_caps_length() {
        let slug = slugify(&"a".repeat(80));
        assert_eq!(slug.len(), 50);
    }

    #[test]
    fn slugify_cut_at_a_separator_has_no_trailing_dash() {
        // 49 letters then a separator: the cut lands right after the dash.
        let title = format!("{} and more", "a".repeat(49));
        let slug = slugify(&title);
        assert_eq!(slug, "a".repeat(49));
        assert_eq!(file_name(&video(&title, "")), format!("abc123-{}.md", "a".repeat(49)));
    }

    #[test]
    fn slugify_of_symbols_is_empty() {
        assert_eq!(slugify("🎉🎉"), "");
        assert_eq!(file_name(&video("🎉", "")), "abc123.md");
        assert_eq!(file_name(&video("Intro", "")), "abc123-intro.md");
    }

    #[test]
    fn display_date_is_long_form() {
        assert_eq!(display_date("2025-01-05T16:00:00Z"), "January 5, 2025");
        assert_eq!(display_date("not a date"), "not a date");
    }

    #[test]
    fn front_matter_is_valid_yaml_with_escaped_quotes() {
        let doc = render_video(
            &video("Say \"hi\" \\o/", "line one\nline \"two\""),
            Some("hello"),
        );
        let fm = front_matter(&doc);
        assert_eq!(fm.title, "Say \"hi\" \\o/");
        assert_eq!(fm.description, "line one line \"two\"");
        assert_eq!(fm.video_id, "abc123");
        assert_eq!(fm.url, "https://youtube.com/watch?v=abc123");
        assert!(fm.has_transcript);
    }

    #[test]
    fn front_matter_description_is_truncated() {
        let doc = render_video(&video("T", &"x".repeat(500)), None);
        let fm = front_matter(&doc);
        assert_eq!(fm.description.len(), 200);
        assert!(doc.contains(&"x".repeat(500)));
    }

    #[test]
    fn body_has_sections_and_transcript() {
        let doc = render_video(&video("Intro", "About things"), Some("word word"));
        assert!(doc.contains("# Intro\n\n> Published on January 5, 2025\n"));
        assert!(doc.contains("## Description\n\nAbout things\n"));
        assert!(doc.contains("[Watch this video](https://youtube.com/watch?v=abc123)"));
        assert!(doc.ends_with("## Transcript\n\nword word\n"));
    }

    #[test]
    fn missing_transcript_leaves_notice() {
        let doc = render_video(&video("Intro", ""), None);
        assert!(!doc.contains("## Transcript"));
        assert!(doc.contains("No transcript available for this video"));
        assert!(!front_matter(&doc).has_transcript);
    }

    #[test]
    fn index_serializes_camel_case() {
        let index = VideoIndex {
            last_sync: "2025-01-05T16:00:00.000Z".into(),
            total_videos: 1,
            channel_id: "UC1".into(),
            handle: None,
            videos: vec![IndexEntry {
                id: "abc123".into(),
                title: "Intro".into(),
                published_at: "2025-01-05T16:00:00Z".into(),
                file: "abc123-intro.md".into(),
                has_transcript: false,
            }],
        };
        let json = serde_json::to_value(&index).unwrap();
        assert_eq!(json["totalVideos"], 1);
        assert_eq!(json["channelId"], "UC1");
        assert!(json.get("handle").is_none());
        assert_eq!(json["videos"][0]["hasTranscript"], false);
        assert_eq!(json["videos"][0]["file"], "abc123-intro.md");
    }
}
