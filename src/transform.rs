//! Built-in transforms.
//!
//! Closures cannot be written in a config file, so declarative patterns pick
//! transforms from this list by name.
//!
//! - `minify`: JavaScript via oxc, CSS via lightningcss

use std::path::Path;

use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleSheet};
use oxc::allocator::Allocator;
use oxc::codegen::{Codegen, CodegenOptions, CommentOptions};
use oxc::mangler::MangleOptions;
use oxc::minifier::{CompressOptions, Minifier, MinifierOptions};
use oxc::parser::Parser;
use oxc::span::SourceType;

use crate::pattern::Transform;

/// Cache identity of the built-in minifier.
pub const MINIFY_ID: &str = "builtin:minify";

/// Names accepted by [`builtin`].
pub const BUILTIN_NAMES: &[&str] = &["minify"];

/// Look up a built-in transform by name.
pub fn builtin(name: &str) -> Option<Transform> {
    match name {
        "minify" => Some(minify()),
        _ => None,
    }
}

/// Minify `.js` and `.css` sources.
///
/// Other files, `*.min.*` files and sources that fail to parse are
/// returned unchanged.
pub fn minify() -> Transform {
    Transform::new(MINIFY_ID, |data: Vec<u8>, path: &Path| {
        if is_minified(path) {
            return Ok(data);
        }
        let Ok(source) = std::str::from_utf8(&data) else {
            return Ok(data);
        };
        match minify_by_ext(path, source) {
            Some(minified) => Ok(minified.into_bytes()),
            None => Ok(data),
        }
    })
}

fn is_minified(path: &Path) -> bool {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .is_some_and(|stem| stem.ends_with(".min"))
}

/// Minify JavaScript source code.
pub fn minify_js(source: &str) -> Option<String> {
    let allocator = Allocator::default();
    let source_type = SourceType::mjs();
    let ret = Parser::new(&allocator, source, source_type).parse();
    if !ret.errors.is_empty() {
        return None;
    }
    let mut program = ret.program;
    let options = MinifierOptions {
        mangle: Some(MangleOptions::default()),
        compress: Some(CompressOptions::smallest()),
    };
    let ret = Minifier::new(options).minify(&allocator, &mut program);
    let code = Codegen::new()
        .with_options(CodegenOptions {
            minify: true,
            comments: CommentOptions::disabled(),
            ..CodegenOptions::default()
        })
        .with_scoping(ret.scoping)
        .build(&program)
        .code;
    Some(code)
}

/// Minify CSS source code.
pub fn minify_css(source: &str) -> Option<String> {
    let stylesheet = StyleSheet::parse(source, ParserOptions::default()).ok()?;
    let result = stylesheet
        .to_css(PrinterOptions {
            minify: true,
            ..PrinterOptions::default()
        })
        .ok()?;
    Some(result.code)
}

/// Minify content based on file extension.
fn minify_by_ext(path: &Path, content: &str) -> Option<String> {
    match path.extension()?.to_str()? {
        "js" | "mjs" => minify_js(content),
        "css" => minify_css(content),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn run(transform: &Transform, data: &str, path: &str) -> String {
        let out = (transform.func)(data.as_bytes().to_vec(), path.into())
            .await
            .unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_builtin_lookup() {
        assert_eq!(builtin("minify").unwrap().id, MINIFY_ID);
        assert!(builtin("uglify").is_none());
        assert!(BUILTIN_NAMES.iter().all(|name| builtin(name).is_some()));
    }

    #[test]
    fn test_minify_css() {
        let out = minify_css("a {\n  color: red;\n}\n").unwrap();
        assert!(!out.contains('\n'));
        assert!(out.contains("color:red"));
    }

    #[test]
    fn test_minify_js_rejects_invalid() {
        assert!(minify_js("function (").is_none());
        assert!(minify_js("export const answer = 40 + 2;").is_some());
    }

    #[tokio::test]
    async fn test_minify_passes_through() {
        let transform = minify();
        let css = "a {\n  color: red;\n}\n";
        assert_eq!(run(&transform, css, "/p/app.min.css").await, css);
        assert_eq!(run(&transform, "hello  world", "/p/a.txt").await, "hello  world");
        assert_eq!(run(&transform, "a {", "/p/broken.js").await, "a {");
        assert_ne!(run(&transform, css, "/p/app.css").await, css);
    }
}
