use crate::coordinates::ModuleCoordinate;

/// Gradle's default layout for Ivy repositories
pub const DEFAULT_IVY_PATTERN: &str = "[organisation]/[module]/[revision]/ivy-[revision].xml";
pub const DEFAULT_ARTIFACT_PATTERN: &str = "[organisation]/[module]/[revision]/[artifact]-[revision](-[classifier])(.[ext])";

/// Values for the tokens of an Ivy pattern
#[derive(Debug, Clone)]
pub struct PatternTokens<'a> {
    pub organisation: &'a str,
    pub module: &'a str,
    pub revision: &'a str,
    pub artifact: &'a str,
    pub artifact_type: &'a str,
    pub ext: &'a str,
    pub classifier: Option<&'a str>,
}

impl<'a> PatternTokens<'a> {
    /// An Ivy descriptor is the artifact 'ivy' of its module
    pub fn for_coordinate(coordinate: &'a ModuleCoordinate) -> PatternTokens<'a> {
        PatternTokens {
            organisation: coordinate.group(),
            module: coordinate.name(),
            revision: coordinate.version(),
            artifact: if coordinate.artifact_type() == "ivy" { "ivy" } else { coordinate.name() },
            artifact_type: coordinate.artifact_type(),
            ext: coordinate.extension(),
            classifier: coordinate.classifier(),
        }
    }

    /// `None` for tokens without a value. Unknown tokens are kept verbatim.
    fn value(&self, token: &str, m2_compatible: bool) -> Option<String> {
        let value = match token {
            "organisation" | "organization" if m2_compatible => return Some(self.organisation.replace('.', "/")),
            "organisation" | "organization" => self.organisation,
            "module" => self.module,
            "revision" => self.revision,
            "artifact" => self.artifact,
            "type" => self.artifact_type,
            "ext" => self.ext,
            "classifier" => self.classifier?,
            other => return Some(format!("[{}]", other)),
        };
        Some(value)
            .filter(|v| !v.is_empty())
            .map(|v| v.to_string())
    }
}

/// Replaces the `[token]`s of a pattern. A part in parentheses is only kept if all tokens inside
///  have a value, e.g. `(-[classifier])`.
pub fn substitute(pattern: &str, tokens: &PatternTokens, m2_compatible: bool) -> String {
    let mut result = String::new();
    // text of the optional part being collected, and whether all its tokens had values
    let mut optional: Option<(String, bool)> = None;

    let mut rest = pattern;
    while let Some(c) = rest.chars().next() {
        match c {
            '[' if rest.contains(']') => {
                let end = rest.find(']').unwrap_or(rest.len());
                let value = tokens.value(&rest[1..end], m2_compatible);
                match &mut optional {
                    Some((text, complete)) => match value {
                        Some(value) => text.push_str(&value),
                        None => *complete = false,
                    },
                    None => result.push_str(value.as_deref().unwrap_or("")),
                }
                rest = &rest[end + 1..];
                continue;
            }
            '(' if optional.is_none() => {
                optional = Some((String::new(), true));
            }
            ')' if optional.is_some() => {
                if let Some((text, true)) = optional.take() {
                    result.push_str(&text);
                }
            }
            c => match &mut optional {
                Some((text, _)) => text.push(c),
                None => result.push(c),
            },
        }
        rest = &rest[c.len_utf8()..];
    }

    // unbalanced '(' at the end of the pattern
    if let Some((text, true)) = optional {
        result.push_str(&text);
    }
    result
}

#[cfg(test)]
mod test {
    use rstest::*;
    use super::*;

    fn coordinate(s: &str) -> ModuleCoordinate {
        s.parse().unwrap()
    }

    #[rstest]
    #[case::artifact(DEFAULT_ARTIFACT_PATTERN, "org.example:lib:1.0", false, "org.example/lib/1.0/lib-1.0.jar")]
    #[case::classifier(DEFAULT_ARTIFACT_PATTERN, "org.example:lib:1.0:sources", false, "org.example/lib/1.0/lib-1.0-sources.jar")]
    #[case::m2_compatible(DEFAULT_ARTIFACT_PATTERN, "org.example:lib:1.0", true, "org/example/lib/1.0/lib-1.0.jar")]
    #[case::descriptor(DEFAULT_IVY_PATTERN, "org.example:lib:1.0@ivy", false, "org.example/lib/1.0/ivy-1.0.xml")]
    #[case::descriptor_as_artifact(DEFAULT_ARTIFACT_PATTERN, "org.example:lib:1.0@ivy", false, "org.example/lib/1.0/ivy-1.0.xml")]
    #[case::type_token("[organization]/[module]/[type]s/[artifact]-[revision].[ext]", "o:m:2@pom", false, "o/m/poms/m-2.pom")]
    #[case::unknown_token("[organisation]/[branch]/[module]", "o:m:2", false, "o/[branch]/m")]
    #[case::optional_literal_only("[module](.x)", "o:m:2", false, "m.x")]
    #[case::unbalanced("[module](-[classifier]", "o:m:2:c", false, "m-c")]
    fn test_substitute(#[case] pattern: &str, #[case] coordinate_string: &str, #[case] m2_compatible: bool, #[case] expected: &str) {
        let coordinate = coordinate(coordinate_string);
        assert_eq!(substitute(pattern, &PatternTokens::for_coordinate(&coordinate), m2_compatible), expected);
    }
}
