use crate::models::{GenerateImageParams, GeneratedImage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GalleryEntry {
    pub id: String,
    pub image_url: String,
    pub prompt: String,
    pub created_at: DateTime<Utc>,
    pub params: GenerateImageParams,
}

/// Generated images of the current session, newest first. Never persisted.
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    entries: Vec<GalleryEntry>,
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, image: &GeneratedImage, params: &GenerateImageParams) -> &GalleryEntry {
        let entry = GalleryEntry {
            id: image
                .image_uuid
                .clone()
                .unwrap_or_else(|| image.task_uuid.clone()),
            image_url: image.image_url.clone(),
            prompt: image.prompt.clone().unwrap_or_else(|| params.prompt.clone()),
            created_at: Utc::now(),
            params: params.clone(),
        };
        self.entries.insert(0, entry);
        &self.entries[0]
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&GalleryEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn remove(&mut self, id: &str) -> Option<GalleryEntry> {
        let index = self.entries.iter().position(|entry| entry.id == id)?;
        Some(self.entries.remove(index))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(task: &str, image_uuid: Option<&str>, url: &str) -> GeneratedImage {
        GeneratedImage {
            task_uuid: task.to_string(),
            image_url: url.to_string(),
            image_uuid: image_uuid.map(String::from),
            prompt: None,
            seed: Some(1),
            nsfw_content: false,
            cost: None,
        }
    }

    #[test]
    fn newest_entry_comes_first() {
        let mut gallery = Gallery::new();
        let params = GenerateImageParams::new("sunset");
        gallery.record(&image("t1", Some("img-1"), "https://x/1.webp"), &params);
        gallery.record(&image("t2", Some("img-2"), "https://x/2.webp"), &params);

        let ids: Vec<&str> = gallery.entries().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["img-2", "img-1"]);
        assert_eq!(gallery.entries()[0].prompt, "sunset");
    }

    #[test]
    fn falls_back_to_task_uuid_for_id() {
        let mut gallery = Gallery::new();
        let entry = gallery.record(&image("t9", None, "u"), &GenerateImageParams::new("cat"));
        assert_eq!(entry.id, "t9");
    }

    #[test]
    fn remove_and_clear() {
        let mut gallery = Gallery::new();
        let params = GenerateImageParams::new("cat");
        gallery.record(&image("t1", Some("a"), "u1"), &params);
        gallery.record(&image("t2", Some("b"), "u2"), &params);

        assert_eq!(gallery.remove("a").map(|e| e.image_url), Some("u1".to_string()));
        assert!(gallery.get("a").is_none());
        assert_eq!(gallery.len(), 1);

        gallery.clear();
        assert!(gallery.is_empty());
    }
}
