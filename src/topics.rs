//! Topic-family detection shared by the canned payloads and fallback generators.

const EDUCATION_TAGS: &[&str] = &["教育", "校园", "education", "campus"];
const TECHNOLOGY_TAGS: &[&str] = &["科技", "技术", "technology", "tech"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicFamily {
    Education,
    Technology,
    General,
}

fn matches_any(tag: &str, keywords: &[&str]) -> bool {
    let tag = tag.trim().to_lowercase();
    !tag.is_empty() && keywords.iter().any(|k| tag == *k || tag.contains(k))
}

/// Education wins over technology when a material carries both.
pub fn classify<S: AsRef<str>>(tags: &[S]) -> TopicFamily {
    if tags.iter().any(|t| matches_any(t.as_ref(), EDUCATION_TAGS)) {
        TopicFamily::Education
    } else if tags.iter().any(|t| matches_any(t.as_ref(), TECHNOLOGY_TAGS)) {
        TopicFamily::Technology
    } else {
        TopicFamily::General
    }
}
