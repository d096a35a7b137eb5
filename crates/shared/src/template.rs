//! Built-in collection templates.
//!
//! Templates are static descriptors, not stored records. File patterns are
//! descriptive only: callers resolve concrete paths themselves.

use serde::Serialize;

use crate::collection::NewCollection;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionTemplate {
    pub name: &'static str,
    pub description: &'static str,
    pub tags: &'static [&'static str],
    pub file_patterns: &'static [&'static str],
    pub chunk_size: u32,
    pub chunk_overlap: u32,
    pub max_size_mb: u32,
}

impl CollectionTemplate {
    /// Creation parameters for a working (non-template) collection based on
    /// this template.
    pub fn to_new_collection(&self, name: impl Into<String>) -> NewCollection {
        NewCollection::new(name)
            .with_description(self.description)
            .with_tags(self.tags.iter().copied())
            .with_chunking(self.chunk_size, self.chunk_overlap)
            .with_max_size_mb(self.max_size_mb)
    }
}

static BUILTIN_TEMPLATES: &[CollectionTemplate] = &[
    CollectionTemplate {
        name: "Python Project",
        description: "Python source files, requirements and project docs",
        tags: &["python", "code"],
        file_patterns: &["*.py", "*.pyi", "requirements*.txt", "pyproject.toml", "*.md"],
        chunk_size: 1000,
        chunk_overlap: 200,
        max_size_mb: 500,
    },
    CollectionTemplate {
        name: "Documentation",
        description: "Markdown, reStructuredText and plain-text documentation",
        tags: &["docs"],
        file_patterns: &["*.md", "*.rst", "*.txt", "*.adoc"],
        chunk_size: 1500,
        chunk_overlap: 300,
        max_size_mb: 200,
    },
    CollectionTemplate {
        name: "Research Papers",
        description: "Papers, notes and references for a research topic",
        tags: &["research", "papers"],
        file_patterns: &["*.pdf", "*.txt", "*.md", "*.bib"],
        chunk_size: 2000,
        chunk_overlap: 400,
        max_size_mb: 1000,
    },
    CollectionTemplate {
        name: "Web Development",
        description: "Front-end sources, styles and configuration",
        tags: &["web", "code"],
        file_patterns: &["*.html", "*.css", "*.js", "*.ts", "*.tsx", "*.json"],
        chunk_size: 800,
        chunk_overlap: 150,
        max_size_mb: 500,
    },
    CollectionTemplate {
        name: "Data Analysis",
        description: "Datasets, notebooks and analysis scripts",
        tags: &["data", "analysis"],
        file_patterns: &["*.csv", "*.json", "*.ipynb", "*.py", "*.sql"],
        chunk_size: 1200,
        chunk_overlap: 200,
        max_size_mb: 2000,
    },
];

pub fn builtin_templates() -> &'static [CollectionTemplate] {
    BUILTIN_TEMPLATES
}

/// Look up a template by exact name.
pub fn find_template(name: &str) -> Option<&'static CollectionTemplate> {
    BUILTIN_TEMPLATES.iter().find(|t| t.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_templates_are_valid() {
        for template in builtin_templates() {
            let new = template.to_new_collection(template.name);
            assert!(new.validate().is_ok(), "{} is invalid", template.name);
            assert!(!new.is_template);
        }
    }

    #[test]
    fn test_find_template_is_exact() {
        assert!(find_template("Documentation").is_some());
        assert!(find_template("documentation").is_none());
        assert!(find_template("Docs").is_none());
    }
}
