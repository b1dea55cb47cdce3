use std::collections::HashSet;

use isf_compiler::layout::analyze;
use isf_compiler::preprocess::preprocess;
use isf_compiler::{compile, InputDecl, InputKind, IsfMetadata};
use proptest::prelude::*;

fn input_kind() -> impl Strategy<Value = InputKind> {
    prop_oneof![
        Just(InputKind::Float),
        Just(InputKind::Long),
        Just(InputKind::Bool),
        Just(InputKind::Event),
        Just(InputKind::Point2D),
        Just(InputKind::Color),
        Just(InputKind::Image),
    ]
}

fn header_type(kind: &InputKind) -> &'static str {
    match kind {
        InputKind::Float => "float",
        InputKind::Long => "long",
        InputKind::Bool => "bool",
        InputKind::Event => "event",
        InputKind::Point2D => "point2D",
        InputKind::Color => "color",
        _ => "image",
    }
}

fn unit_with_inputs(kinds: &[InputKind]) -> String {
    let inputs = kinds
        .iter()
        .enumerate()
        .map(|(i, kind)| format!(r#"{{ "NAME": "in{i}", "TYPE": "{}" }}"#, header_type(kind)))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "/*{{ \"INPUTS\": [{inputs}] }}*/\nvoid main() {{ gl_FragColor = vec4(isf_FragNormCoord, TIME, 1.0); }}\n"
    )
}

proptest! {
    #[test]
    fn layout_fields_are_aligned_and_padded(kinds in prop::collection::vec(input_kind(), 0..16)) {
        let metadata = IsfMetadata {
            inputs: kinds
                .iter()
                .enumerate()
                .map(|(i, kind)| InputDecl::new(format!("in{i}"), kind.clone()))
                .collect(),
            ..IsfMetadata::default()
        };
        let mut warnings = Vec::new();
        let layout = analyze(&metadata, "isf_", &mut warnings);

        prop_assert_eq!(layout.size % 16, 0);
        let mut end = 0;
        for field in &layout.fields {
            prop_assert_eq!(field.offset % field.ty.align(), 0);
            prop_assert!(field.offset >= end, "{} overlaps its predecessor", field.name);
            end = field.offset + field.size;
        }
        prop_assert!(layout.size >= end);

        let images = kinds.iter().filter(|k| **k == InputKind::Image).count();
        prop_assert_eq!(layout.textures.len(), images);
        for (slot, texture) in layout.textures.iter().enumerate() {
            prop_assert_eq!(texture.texture, slot as u32 * 2);
            prop_assert_eq!(texture.sampler, slot as u32 * 2 + 1);
        }
    }

    #[test]
    fn single_pass_units_never_bind_passes(kinds in prop::collection::vec(input_kind(), 0..8)) {
        let output = compile(&unit_with_inputs(&kinds)).unwrap();
        prop_assert!(output.layout.passes.is_empty());
        prop_assert!(!output.fragment.contains("pass0"));
    }

    #[test]
    fn compiling_twice_is_identical(kinds in prop::collection::vec(input_kind(), 0..8)) {
        let source = unit_with_inputs(&kinds);
        let first = compile(&source).unwrap();
        let second = compile(&source).unwrap();
        prop_assert_eq!(first.fragment, second.fragment);
        prop_assert_eq!(first.layout, second.layout);
    }

    #[test]
    fn nested_conditionals_leave_no_ternary(depth in 1usize..10) {
        let mut expr = String::from("1.0");
        for level in (0..depth).rev() {
            expr = format!("(x < {level}.5 ? {level}.0 : {expr})");
        }
        let source = format!(
            "/*{{ \"INPUTS\": [] }}*/\nvoid main() {{ float x = isf_FragNormCoord.x * 10.0; float v = {expr}; gl_FragColor = vec4(v); }}\n"
        );
        let output = compile(&source).unwrap();
        prop_assert!(!output.fragment.contains('?'));
        prop_assert_eq!(output.fragment.matches("select(").count(), depth);
        prop_assert!(output.validation.passed, "{:?}", output.validation.findings);
    }

    #[test]
    fn expanded_text_is_a_fixed_point(values in prop::collection::vec(0u32..100, 1..6)) {
        let mut body = String::new();
        for (i, value) in values.iter().enumerate() {
            body.push_str(&format!("#define K{i} {value}.0\n"));
        }
        let uses = (0..values.len())
            .map(|i| format!("K{i}"))
            .collect::<Vec<_>>()
            .join(" + ");
        body.push_str(&format!("float total = {uses};\n"));

        let inputs = HashSet::new();
        let mut warnings = Vec::new();
        let once = preprocess(&body, &inputs, 32, &mut warnings);
        let twice = preprocess(&once.text, &inputs, 32, &mut warnings);
        prop_assert_eq!(&once.text, &twice.text);
        prop_assert!(!once.text.contains("K0"));
        prop_assert!(warnings.is_empty());
    }

    #[test]
    fn matching_shapes_are_not_promoted(
        function in prop::sample::select(vec!["min", "max", "clamp", "mix", "step", "smoothstep"]),
        width in 1u8..5,
    ) {
        let (glsl, wgsl) = if width == 1 {
            ("float".to_string(), "f32".to_string())
        } else {
            (format!("vec{width}"), format!("vec{width}<f32>"))
        };
        let args = if matches!(function, "clamp" | "mix" | "smoothstep") { "a, b, c" } else { "a, b" };
        let source = format!(
            "/*{{ \"INPUTS\": [] }}*/\nvoid main() {{ {glsl} a = {glsl}(0.1); {glsl} b = {glsl}(0.2); {glsl} c = {glsl}(0.3); {glsl} r = {function}({args}); gl_FragColor = vec4(0.0); }}\n"
        );
        let output = compile(&source).unwrap();
        let expected = format!("var r: {wgsl} = {function}({args});");
        prop_assert!(output.fragment.contains(&expected), "{}", output.fragment);
    }

    #[test]
    fn only_declared_reserved_words_are_renamed(
        word in prop::sample::select(vec![
            "filter", "target", "ref", "type", "match", "self", "meta", "module", "unsafe", "yield",
        ]),
    ) {
        let source = format!(
            "/*{{ \"INPUTS\": [] }}*/\nvoid main() {{ float {word} = 1.0; float {word}Amount = 2.0; gl_FragColor = vec4({word} * {word}Amount); }}\n"
        );
        let output = compile(&source).unwrap();
        let renamed = format!("isf_{word}");
        let declared_renamed = format!("var {renamed}: f32 = 1.0;");
        let declared_kept = format!("var {word}Amount: f32 = 2.0;");
        prop_assert!(output.fragment.contains(&declared_renamed), "{}", output.fragment);
        prop_assert!(output.fragment.contains(&declared_kept), "{}", output.fragment);
        prop_assert_eq!(output.renamed.len(), 1);
        prop_assert_eq!(output.renamed.get(word), Some(&renamed));
    }
}
