//! Silent-install response file for the installation manager.

use lm_config::{Offering, ResponseSettings};
use std::fmt::Write as _;
use std::path::Path;

pub const RESPONSE_FILE_NAME: &str = "install_response.xml";

/// Inputs for one `agent-input` document.
pub struct ResponseFile<'a> {
    pub settings: &'a ResponseSettings,
    pub offerings: Vec<&'a Offering>,
    pub install_dir: &'a Path,
    pub repository: &'a Path,
    pub password: &'a str,
}

impl ResponseFile<'_> {
    pub fn render(&self) -> String {
        let mut xml = String::with_capacity(2048);
        xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        xml.push_str("<agent-input clean=\"true\" temporary=\"true\">\n");

        xml.push_str("  <variables>\n");
        let port = self.settings.secure_port.to_string();
        let install_dir = self.install_dir.to_string_lossy();
        for (name, value) in [
            ("license.selection", self.settings.license.as_str()),
            ("port", port.as_str()),
            ("ssl.password", self.password),
            ("enable.SP800131a", ""),
            ("install.dir", &*install_dir),
        ] {
            element(&mut xml, 4, "variable", &[("name", name), ("value", value)]);
        }
        xml.push_str("  </variables>\n");

        xml.push_str("  <server>\n");
        let repository = self.repository.to_string_lossy();
        element(&mut xml, 4, "repository", &[("location", &*repository)]);
        xml.push_str("  </server>\n");

        let _ = writeln!(
            xml,
            "  <profile id=\"{}\" installLocation=\"${{install.dir}}\">",
            escape(&self.settings.profile_id)
        );
        for (key, value) in [
            ("user.license,com.tivoli.dsm.server", "${license.selection}"),
            ("user.securePortNumber,com.tivoli.dsm.gui.offering", "${port}"),
            ("user.enableSP800_131,com.tivoli.dsm.gui.offering", "${enable.SP800131a}"),
            ("user.SSL_PASSWORD", "${ssl.password}"),
        ] {
            element(&mut xml, 4, "data", &[("key", key), ("value", value)]);
        }
        xml.push_str("  </profile>\n");

        xml.push_str("  <install modify=\"false\">\n");
        for offering in &self.offerings {
            let features = offering.features.join(",");
            let mut attrs = vec![
                ("profile", offering.profile.as_str()),
                ("id", offering.id.as_str()),
                ("installFixes", offering.install_fixes.as_str()),
            ];
            if !features.is_empty() {
                attrs.push(("features", features.as_str()));
            }
            attrs.push(("selected", "true"));
            element(&mut xml, 4, "offering", &attrs);
        }
        xml.push_str("  </install>\n");

        for (name, value) in &self.settings.preferences {
            element(
                &mut xml,
                2,
                "preference",
                &[("name", name.as_str()), ("value", value.as_str())],
            );
        }
        xml.push_str("</agent-input>\n");
        xml
    }
}

fn element(out: &mut String, indent: usize, tag: &str, attrs: &[(&str, &str)]) {
    let _ = write!(out, "{:indent$}<{}", "", tag, indent = indent);
    for (k, v) in attrs {
        let _ = write!(out, " {}=\"{}\"", k, escape(v));
    }
    out.push_str("/>\n");
}

/// Escape text for an XML attribute value.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use lm_config::ComponentSpec;

    #[test]
    fn test_escape() {
        assert_eq!(escape(r#"a<b>&"c"'"#), "a&lt;b&gt;&amp;&quot;c&quot;&apos;");
        assert_eq!(escape("plain"), "plain");
    }

    #[test]
    fn test_render_server_response() {
        let mut server = ComponentSpec::builtin_server();
        server.offerings[2].enabled = false;
        let settings = server.response.clone().unwrap();
        let doc = ResponseFile {
            settings: &settings,
            offerings: server.enabled_offerings().collect(),
            install_dir: Path::new("/opt/ba-server"),
            repository: Path::new("/art/extracted/repository"),
            password: "p&ss\"word",
        }
        .render();

        assert!(doc.starts_with("<?xml"));
        assert!(doc.contains(r#"<variable name="ssl.password" value="p&amp;ss&quot;word"/>"#));
        assert!(doc.contains(r#"<variable name="install.dir" value="/opt/ba-server"/>"#));
        assert!(doc.contains(r#"<variable name="port" value="11090"/>"#));
        assert!(doc.contains(r#"<repository location="/art/extracted/repository"/>"#));
        assert!(doc.contains(r#"installLocation="${install.dir}""#));
        assert_eq!(doc.matches("<offering ").count(), 5);
        assert!(!doc.contains("com.tivoli.dsm.devices\""));
        assert!(doc.contains(
            r#"features="com.tivoli.dsm.server.main,com.tivoli.dsm.gskit,com.tivoli.dsm.clientapi,com.ibm.java.jre""#
        ));
        assert!(doc.contains(r#"<preference name="PassportAdvantageIsEnabled" value="false"/>"#));
        assert!(doc.trim_end().ends_with("</agent-input>"));
    }
}
