//! Static vocabulary of the shading dialect.

pub const QUALIFIERS: &[&str] = &["static", "const", "volatile"];

/// Non-templated type names recognized as `SystemType`. The numeric vector
/// and matrix families (`float3`, `uint4x4`, ...) are matched separately by
/// [`is_vector_or_matrix`].
pub const PLAIN_SYSTEM_TYPES: &[&str] = &[
    "void",
    "bool",
    "int",
    "uint",
    "dword",
    "half",
    "float",
    "double",
    "texture",
    "sampler",
    "SamplerState",
    "SamplerComparisonState",
    "RaytracingAccelerationStructure",
    "ByteAddressBuffer",
];

const NUMERIC_FAMILIES: &[&str] = &["bool", "int", "uint", "half", "float", "double"];

pub const TEMPLATED_SYSTEM_TYPES: &[&str] = &[
    "Buffer",
    "Texture1D",
    "Texture1DArray",
    "Texture2D",
    "Texture2DArray",
    "Texture3D",
    "TextureCube",
    "TextureCubeArray",
    "Texture2DMS",
    "Texture2DMSArray",
    "RWBuffer",
    "RWByteAddressBuffer",
    "RWStructuredBuffer",
    "AppendStructuredBuffer",
    "RWTexture1D",
    "RWTexture1DArray",
    "RWTexture2D",
    "RWTexture2DArray",
    "RWTexture3D",
    "StructuredBuffer",
    "ConstantBuffer",
];

fn is_dim(s: &str) -> bool {
    matches!(s, "1" | "2" | "3" | "4")
}

/// `floatN` and `floatNxM` style names over every numeric family, with `N`
/// and `M` in `1..=4`.
pub fn is_vector_or_matrix(name: &str) -> bool {
    NUMERIC_FAMILIES.iter().any(|family| {
        let Some(shape) = name.strip_prefix(family) else {
            return false;
        };
        match shape.split_once('x') {
            Some((rows, cols)) => is_dim(rows) && is_dim(cols),
            None => is_dim(shape),
        }
    })
}

/// Types that can head a declaration or a function without a template
/// argument list.
pub fn is_complete_system_type(name: &str) -> bool {
    PLAIN_SYSTEM_TYPES.contains(&name) || is_vector_or_matrix(name)
}

pub fn is_templated_system_type(name: &str) -> bool {
    TEMPLATED_SYSTEM_TYPES.contains(&name)
}

pub fn is_system_type(name: &str) -> bool {
    is_complete_system_type(name) || is_templated_system_type(name)
}

pub fn is_qualifier(name: &str) -> bool {
    QUALIFIERS.contains(&name)
}

macro_rules! define_operators {
    ($( $lit:literal => $name:ident )*) => {
        /// Every operator spelling and its token value, longest spelling first.
        pub const OPERATORS: &[(&str, &str)] = &[
            $( ($lit, stringify!($name)), )*
        ];
    };
}

define_operators! {
    "<<=" => bitwise_left_shift_assignment
    ">>=" => bitwise_right_shift_assignment
    "++" => increment
    "--" => decrement
    "==" => equal
    "!=" => not_equal
    ">=" => greater_equal
    "<=" => lesser_equal
    "&&" => logical_and
    "||" => logical_or
    "<<" => bitwise_left_shift
    ">>" => bitwise_right_shift
    "+=" => addition_assignment
    "-=" => subtraction_assignment
    "*=" => multiplication_assignment
    "/=" => division_assignment
    "%=" => modulo_assignment
    "&=" => bitwise_and_assignment
    "|=" => bitwise_or_assignment
    "^=" => bitwise_xor_assignment
    "=" => assignment
    "+" => addition
    "-" => subtraction
    "*" => multiplication
    "/" => division
    "%" => modulo
    ">" => greater
    "<" => lesser
    "!" => logical_not
    "~" => bitwise_not
    "&" => bitwise_and
    "|" => bitwise_or
    "^" => bitwise_xor
}

pub const MAX_OPERATOR_LEN: usize = 3;

/// Single-character punctuation that did not match any operator.
pub fn punctuation(c: char) -> Option<(&'static str, super::TokenKind)> {
    use super::TokenKind::*;
    let out = match c {
        '.' => ("dot_operator", Operator),
        ',' => ("comma_operator", Operator),
        '(' => ("left_parentheses", Parenthesis),
        ')' => ("right_parentheses", Parenthesis),
        '[' => ("left_bracket", Bracket),
        ']' => ("right_bracket", Bracket),
        '{' => ("left_brace", Brace),
        '}' => ("right_brace", Brace),
        ';' => ("semicolon", Semicolon),
        ':' => ("colon", Colon),
        _ => return None,
    };
    Some(out)
}
