//! Mirror candidates for GitHub-hosted links.

/// Only links under this prefix get mirrors
const GITHUB_PREFIX: &str = "https://github.com/";

/// Proxy rewrites tried after the primary link, in order.
///
/// `{url}` is the full primary URL, `{path}` is the URL without the
/// GitHub prefix.
const DEFAULT_TEMPLATES: [&str; 3] = [
    "https://ghproxy.com/{url}",
    "https://raw.kkgithub.com/{path}",
    "https://mirror.ghproxy.com/{url}",
];

/// Expands a primary URL into the ordered candidate list
#[derive(Debug, Clone)]
pub struct MirrorPolicy {
    templates: Vec<String>,
}

impl Default for MirrorPolicy {
    fn default() -> Self {
        Self {
            templates: DEFAULT_TEMPLATES.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl MirrorPolicy {
    /// No mirrors; every link goes direct
    pub fn direct_only() -> Self {
        Self { templates: Vec::new() }
    }

    /// Primary first, then each rewrite. Non-GitHub links are returned alone.
    pub fn candidates(&self, url: &str) -> Vec<String> {
        let mut out = vec![url.to_string()];

        let Some(path) = url.strip_prefix(GITHUB_PREFIX) else {
            return out;
        };

        for template in &self.templates {
            let mirror = template.replace("{url}", url).replace("{path}", path);
            if !out.contains(&mirror) {
                out.push(mirror);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_github_links_get_mirrors() {
        let url = "https://github.com/org/repo/releases/download/EP01/EP01.zip";
        let candidates = MirrorPolicy::default().candidates(url);
        assert_eq!(
            candidates,
            vec![
                url.to_string(),
                format!("https://ghproxy.com/{}", url),
                "https://raw.kkgithub.com/org/repo/releases/download/EP01/EP01.zip".to_string(),
                format!("https://mirror.ghproxy.com/{}", url),
            ]
        );
    }

    #[test]
    fn test_other_hosts_go_direct() {
        let url = "https://download1077.mediafire.com/abc/EP03.zip";
        assert_eq!(MirrorPolicy::default().candidates(url), vec![url.to_string()]);
        assert_eq!(
            MirrorPolicy::direct_only().candidates("https://github.com/a/b.zip"),
            vec!["https://github.com/a/b.zip".to_string()]
        );
    }
}
