//! Static, read-only knowledge the scanner ships with.
//!
//! Everything here is a default: the header checklist, port catalogue, technology
//! signatures and grade thresholds are copied into `ScanConfig` at start-up and can be
//! overridden from the configuration file. The suffix, registrar and RDAP tables are
//! used directly by the normalizer and the trust analyzer.

use crate::core::models::Grade;

/// One entry of the security header checklist.
pub struct HeaderRule {
    /// Canonical header name as it appears in the report.
    pub name: &'static str,
    /// Short advice shown next to the header in the report.
    pub recommendation: &'static str,
    /// Concrete fix, used as the message of the finding raised when the header is missing.
    pub remediation: &'static str,
}

/// The default security header checklist.
pub static SECURITY_HEADERS: &[HeaderRule] = &[
    HeaderRule {
        name: "Strict-Transport-Security",
        recommendation: "Enable HSTS to force HTTPS connections",
        remediation: "Missing Strict-Transport-Security: add 'max-age=31536000; includeSubDomains' to force HTTPS connections",
    },
    HeaderRule {
        name: "Content-Security-Policy",
        recommendation: "Implement CSP to prevent XSS attacks",
        remediation: "Missing Content-Security-Policy: define a policy starting from \"default-src 'self'\" to prevent XSS attacks",
    },
    HeaderRule {
        name: "X-Frame-Options",
        recommendation: "Set to DENY or SAMEORIGIN to prevent clickjacking",
        remediation: "Missing X-Frame-Options: set it to DENY or SAMEORIGIN to prevent clickjacking",
    },
    HeaderRule {
        name: "X-Content-Type-Options",
        recommendation: "Set to nosniff to prevent MIME sniffing",
        remediation: "Missing X-Content-Type-Options: set it to nosniff to prevent MIME sniffing",
    },
    HeaderRule {
        name: "Referrer-Policy",
        recommendation: "Control referrer information sent with requests",
        remediation: "Missing Referrer-Policy: use 'strict-origin-when-cross-origin' to limit referrer leakage",
    },
    HeaderRule {
        name: "Permissions-Policy",
        recommendation: "Control browser features and APIs",
        remediation: "Missing Permissions-Policy: disable browser features the site does not use, e.g. 'camera=(), microphone=()'",
    },
];

/// Well-known TCP services, in the order they are probed by default.
pub static PORT_CATALOGUE: &[(u16, &str)] = &[
    (21, "FTP"),
    (22, "SSH"),
    (23, "Telnet"),
    (25, "SMTP"),
    (53, "DNS"),
    (80, "HTTP"),
    (110, "POP3"),
    (143, "IMAP"),
    (443, "HTTPS"),
    (445, "SMB"),
    (993, "IMAPS"),
    (995, "POP3S"),
    (3306, "MySQL"),
    (3389, "RDP"),
    (5432, "PostgreSQL"),
    (8080, "HTTP-Alt"),
    (8443, "HTTPS-Alt"),
];

/// Extra labels for ports that may appear in a custom port list.
static EXTRA_SERVICES: &[(u16, &str)] = &[
    (1433, "MSSQL"),
    (5900, "VNC"),
    (6379, "Redis"),
    (9200, "Elasticsearch"),
    (11211, "Memcached"),
    (27017, "MongoDB"),
];

/// Services that should never be reachable from the internet.
pub static RISKY_PORTS: &[u16] = &[21, 23, 445, 1433, 3306, 3389, 5432, 5900, 6379, 27017];

/// Labels a port by well-known-port convention.
pub fn service_name(port: u16) -> &'static str {
    PORT_CATALOGUE
        .iter()
        .chain(EXTRA_SERVICES)
        .find(|(p, _)| *p == port)
        .map(|(_, name)| *name)
        .unwrap_or("Unknown")
}

pub fn is_risky_port(port: u16) -> bool {
    RISKY_PORTS.contains(&port)
}

/// Public suffixes spanning more than one label. Anything else falls back to the last label.
pub static MULTI_PART_SUFFIXES: &[&str] = &[
    "co.uk", "org.uk", "ac.uk", "gov.uk", "ltd.uk", "plc.uk", "me.uk", "net.uk",
    "com.au", "net.au", "org.au", "edu.au", "gov.au",
    "co.nz", "org.nz", "net.nz",
    "co.jp", "ne.jp", "or.jp", "ac.jp",
    "co.in", "net.in", "org.in", "gov.in",
    "com.br", "net.br", "org.br", "gov.br",
    "com.cn", "net.cn", "org.cn", "gov.cn",
    "co.za", "org.za",
    "com.mx", "com.ar", "com.tr", "com.sg", "com.hk", "com.tw", "com.my",
    "co.kr", "or.kr", "co.il", "co.id",
];

/// A named technology and the lowercase markers that reveal it.
pub struct SignatureRule {
    pub name: &'static str,
    pub patterns: &'static [&'static str],
}

/// CMS markers. The first match wins, so order matters.
pub static CMS_SIGNATURES: &[SignatureRule] = &[
    SignatureRule { name: "WordPress", patterns: &["wp-content", "wp-includes", "wordpress"] },
    SignatureRule { name: "Drupal", patterns: &["drupal", "sites/default"] },
    SignatureRule { name: "Joomla", patterns: &["joomla", "/components/com_"] },
    SignatureRule { name: "Shopify", patterns: &["shopify", "cdn.shopify.com"] },
    SignatureRule { name: "Wix", patterns: &["wix.com", "wixstatic.com"] },
    SignatureRule { name: "Squarespace", patterns: &["squarespace"] },
    SignatureRule { name: "Magento", patterns: &["magento", "mage/"] },
    SignatureRule { name: "Ghost", patterns: &["ghost.io", "ghost-frontend"] },
];

pub static JS_SIGNATURES: &[SignatureRule] = &[
    SignatureRule { name: "jQuery", patterns: &["jquery"] },
    SignatureRule { name: "React", patterns: &["react", "reactdom"] },
    SignatureRule { name: "Vue.js", patterns: &["vue.js", "vuejs", "vue.min.js"] },
    SignatureRule { name: "Angular", patterns: &["angular", "ng-app"] },
    SignatureRule { name: "Bootstrap", patterns: &["bootstrap"] },
    SignatureRule { name: "Tailwind", patterns: &["tailwind"] },
    SignatureRule { name: "Next.js", patterns: &["_next/", "nextjs"] },
];

/// CDN markers, matched against the body and the response headers.
pub static CDN_SIGNATURES: &[SignatureRule] = &[
    SignatureRule { name: "Cloudflare", patterns: &["cloudflare", "cf-ray"] },
    SignatureRule { name: "AWS CloudFront", patterns: &["cloudfront.net", "x-amz-cf"] },
    SignatureRule { name: "Akamai", patterns: &["akamai", "akamaized"] },
    SignatureRule { name: "Fastly", patterns: &["fastly"] },
    SignatureRule { name: "Vercel", patterns: &["vercel", "x-vercel"] },
];

pub static ANALYTICS_SIGNATURES: &[SignatureRule] = &[
    SignatureRule {
        name: "Google Analytics",
        patterns: &["google-analytics", "gtag(", "ga.js", "analytics.js"],
    },
    SignatureRule { name: "Google Tag Manager", patterns: &["googletagmanager"] },
    SignatureRule { name: "Facebook Pixel", patterns: &["fbq(", "connect.facebook.net"] },
    SignatureRule { name: "Hotjar", patterns: &["hotjar"] },
    SignatureRule { name: "Mixpanel", patterns: &["mixpanel"] },
];

/// Default score floors for each grade, highest first.
pub static GRADE_THRESHOLDS: &[(u8, Grade)] = &[
    (97, Grade::APlus),
    (93, Grade::A),
    (80, Grade::B),
    (65, Grade::C),
    (50, Grade::D),
];

/// Registrars with an established abuse-handling record. Matched as lowercase substrings
/// of the registrar name with spaces removed.
pub static REPUTABLE_REGISTRARS: &[&str] = &[
    "godaddy",
    "namecheap",
    "google",
    "markmonitor",
    "networksolutions",
    "enom",
    "tucows",
    "gandi",
    "cloudflare",
];

/// Markers of a privacy-protected or redacted registrant organisation.
pub static PRIVACY_MARKERS: &[&str] = &[
    "privacy",
    "redacted",
    "proxy",
    "protected",
    "whoisguard",
    "withheld",
    "private",
];

/// Authoritative RDAP servers for common TLDs. Other TLDs go through the rdap.org bootstrap.
pub static RDAP_SERVERS: &[(&str, &str)] = &[
    ("com", "https://rdap.verisign.com/com/v1/domain/"),
    ("net", "https://rdap.verisign.com/net/v1/domain/"),
    ("org", "https://rdap.publicinterestregistry.org/rdap/domain/"),
    ("io", "https://rdap.identitydigital.services/rdap/domain/"),
    ("app", "https://pubapi.registry.google/rdap/domain/"),
    ("dev", "https://pubapi.registry.google/rdap/domain/"),
    ("uk", "https://rdap.nominet.uk/uk/domain/"),
];

pub const RDAP_BOOTSTRAP: &str = "https://rdap.org/domain/";
pub const WHOIS_ROOT_SERVER: &str = "whois.iana.org";

/// Returns the RDAP lookup URL for `domain`, keyed on its last label.
pub fn rdap_url(domain: &str) -> String {
    let tld = domain.rsplit('.').next().unwrap_or(domain);
    let base = RDAP_SERVERS
        .iter()
        .find(|(t, _)| t.eq_ignore_ascii_case(tld))
        .map(|(_, url)| *url)
        .unwrap_or(RDAP_BOOTSTRAP);
    format!("{base}{domain}")
}
