use url::Url;

#[derive(Debug, Clone, Copy)]
pub struct SupportedSite {
    pub name: &'static str,
    pub icon: &'static str,
    pub domains: &'static [&'static str],
}

pub const SUPPORTED_SITES: [SupportedSite; 4] = [
    SupportedSite {
        name: "YouTube",
        icon: "fab fa-youtube",
        domains: &["youtube.com", "youtu.be"],
    },
    SupportedSite {
        name: "Facebook",
        icon: "fab fa-facebook",
        domains: &["facebook.com", "fb.com", "fb.watch"],
    },
    SupportedSite {
        name: "Instagram",
        icon: "fab fa-instagram",
        domains: &["instagram.com"],
    },
    SupportedSite {
        name: "TikTok",
        icon: "fab fa-tiktok",
        domains: &["tiktok.com"],
    },
];

/// Host containment check against every configured site. A leading `www.`
/// is ignored; anything that does not parse as a URL with a host is
/// unsupported.
pub fn is_supported(input: &str) -> bool {
    let Some(host) = Url::parse(input)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_ascii_lowercase))
    else {
        return false;
    };

    let host = host.strip_prefix("www.").unwrap_or(&host);

    SUPPORTED_SITES
        .iter()
        .flat_map(|site| site.domains.iter())
        .any(|domain| host.contains(domain))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_known_hosts() {
        assert!(is_supported("https://www.youtube.com/watch?v=abc"));
        assert!(is_supported("https://youtu.be/abc"));
        assert!(is_supported("https://m.facebook.com/watch/?v=1"));
        assert!(is_supported("https://fb.watch/xyz/"));
        assert!(is_supported("https://WWW.Instagram.com/reel/abc/"));
        assert!(is_supported("https://vm.tiktok.com/ZM123/"));
    }

    #[test]
    fn rejects_other_hosts() {
        assert!(!is_supported("https://vimeo.com/123"));
        assert!(!is_supported("https://example.org/youtube.com"));
        assert!(!is_supported("not-a-url"));
        assert!(!is_supported("mailto:someone@youtube.com"));
    }
}
