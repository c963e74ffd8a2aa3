///! Tokenized Quake 2/3 .map text parser

use crate::{config::QuakeVersion, math::Vec3d};

/// Texture projection as written in face line
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum FaceTexGen {
    /// `[ ux uy uz ud ] [ vx vy vz vd ] rot sx sy` layout
    Quake2 {
        /// U projection plane (normal, offset)
        u: [f64; 4],

        /// V projection plane (normal, offset)
        v: [f64; 4],

        /// Texture rotation (in degrees), already baked into projection planes
        rotation: f64,

        /// Texture scale by X (in texels per unit)
        scale_x: f64,

        /// Texture scale by Y (in texels per unit)
        scale_y: f64,
    },

    /// `su sv rot sx sy` layout, projected along the best fitting base axis
    Quake3 {
        /// Texture offset by X (in texels)
        shift_u: f64,

        /// Texture offset by Y (in texels)
        shift_v: f64,

        /// Texture rotation (in degrees)
        rotation: f64,

        /// Texture scale by X
        scale_x: f64,

        /// Texture scale by Y
        scale_y: f64,
    },
}

/// Brush face line
#[derive(Clone, Debug, PartialEq)]
pub struct RawFace {
    /// Plane points, clockwise seen from outside of brush
    pub points: [Vec3d; 3],

    /// Texture name, as written
    pub texture: String,

    /// Texture projection
    pub texgen: FaceTexGen,
}

/// Brush, face list
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawBrush {
    /// Face set
    pub faces: Vec<RawFace>,
}

/// `{ "key" "value" ... { brush } ... }` block
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawEntity<'t> {
    /// Entity properties, in declaration order, unquoted
    pub properties: Vec<(&'t str, &'t str)>,

    /// Brushes, in file order
    pub brushes: Vec<RawBrush>,
}

impl<'t> RawEntity<'t> {
    /// Find property by case-insensitive key
    pub fn property(&self, key: &str) -> Option<&'t str> {
        self.properties
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| *v)
    }

    /// Entity class name
    pub fn class_name(&self) -> Option<&'t str> {
        self.property("classname")
    }
}

/// Parsed `.map` file
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawMap<'t> {
    /// Entities, worldspawn usually first
    pub entities: Vec<RawEntity<'t>>,
}

/// `.map` text error, borrowing the offending tokens
#[derive(Debug, PartialEq, Eq)]
pub enum MapParseError<'t> {
    /// Text ended inside an entity, brush or face line
    NextTokenExpected,

    /// Bad plane point coordinate, texgen component or scale
    FloatParsingError {
        /// Offending token
        token: &'t str,

        /// Reason
        error: std::num::ParseFloatError,
    },

    /// Bad integer property value
    IntParsingError {
        /// Offending token
        token: &'t str,

        /// Reason
        error: std::num::ParseIntError,
    },

    /// Entity key or value is not a quoted string
    InvalidProperty {
        /// Key token, as written
        key: &'t str,

        /// Value token, as written
        value: &'t str,
    },

    /// Brace, parenthesis or bracket missing
    UnexpectedToken {
        /// Token found
        actual: &'t str,

        /// Delimiter the grammar requires here
        expected: &'t str,
    },

    /// Map has no worldspawn entity
    MissingWorldSpawn,
}

impl<'t> std::fmt::Display for MapParseError<'t> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NextTokenExpected => write!(f, "unexpected end of file"),
            Self::FloatParsingError { token, error } => write!(f, "invalid number \"{}\": {}", token, error),
            Self::IntParsingError { token, error } => write!(f, "invalid integer \"{}\": {}", token, error),
            Self::InvalidProperty { key, value } => write!(f, "invalid property {} {}", key, value),
            Self::UnexpectedToken { actual, expected } => write!(f, "expected \"{}\", got \"{}\"", expected, actual),
            Self::MissingWorldSpawn => write!(f, "map must have a worldspawn entity"),
        }
    }
}

/// Split first token off `text`. Tokens are separated by whitespace, `//` starts a
/// line comment, a quoted property string (which may hold spaces) is one token.
fn parse_token<'t>(mut text: &'t str) -> Result<(&'t str, &'t str), MapParseError<'t>> {
    'comment_loop: loop {
        text = text.trim_start();

        match text.strip_prefix("//") {
            Some(comment) => text = comment.find('\n').map_or("", |end| &comment[end..]),
            None => break 'comment_loop,
        }
    }

    if text.is_empty() {
        return Err(MapParseError::NextTokenExpected);
    }

    // quotes stay in the token, property parsing checks them
    if text.starts_with('\"') {
        return Ok(match text[1..].find('\"') {
            Some(end) => text.split_at(end + 2),
            None => (text, ""),
        });
    }

    Ok(text.split_once(char::is_whitespace).unwrap_or((text, "")))
}

/// Split text into tokens: braces, parentheses, brackets, numbers, texture names
/// and quoted strings
pub fn tokenize<'t>(text: &'t str) -> Vec<&'t str> {
    let mut rest = text;
    let mut tokens = Vec::new();

    while let Ok((token, next)) = parse_token(rest) {
        tokens.push(token);
        rest = next;
    }

    tokens
}

/// Take next token, whatever it is
fn parse_next_token<'t, 'l>(tl: &'l [&'t str]) -> Result<(&'t str, &'l [&'t str]), MapParseError<'t>> {
    tl.split_first()
        .map(|(token, rest)| (*token, rest))
        .ok_or(MapParseError::NextTokenExpected)
}

fn parse_literal<'t, 'l>(tl: &'l [&'t str], lit: &'t str) -> Result<((), &'l [&'t str]), MapParseError<'t>> {
    let (token, tl) = parse_next_token(tl)?;

    match token == lit {
        true => Ok(((), tl)),
        false => Err(MapParseError::UnexpectedToken { actual: token, expected: lit }),
    }
}

fn parse_float<'t, 'l>(tl: &'l [&'t str]) -> Result<(f64, &'l [&'t str]), MapParseError<'t>> {
    let (token, tl) = parse_next_token(tl)?;

    token
        .parse::<f64>()
        .map(|value| (value, tl))
        .map_err(|error| MapParseError::FloatParsingError { token, error })
}

fn parse_vector<'t, 'l>(tl: &'l [&'t str]) -> Result<(Vec3d, &'l [&'t str]), MapParseError<'t>> {
    let (_, tl) = parse_literal(tl, "(")?;
    let (x, tl) = parse_float(tl)?;
    let (y, tl) = parse_float(tl)?;
    let (z, tl) = parse_float(tl)?;
    let (_, tl) = parse_literal(tl, ")")?;

    Ok((Vec3d::new(x, y, z), tl))
}

fn parse_projection<'t, 'l>(tl: &'l [&'t str]) -> Result<([f64; 4], &'l [&'t str]), MapParseError<'t>> {
    let (_, tl) = parse_literal(tl, "[")?;
    let (x, tl) = parse_float(tl)?;
    let (y, tl) = parse_float(tl)?;
    let (z, tl) = parse_float(tl)?;
    let (d, tl) = parse_float(tl)?;
    let (_, tl) = parse_literal(tl, "]")?;

    Ok(([x, y, z, d], tl))
}

fn parse_brush_face<'t, 'l>(
    mut tl: &'l [&'t str],
    version: QuakeVersion,
) -> Result<(RawFace, &'l [&'t str]), MapParseError<'t>> {
    let p0;
    let p1;
    let p2;
    let texture;

    // ( x y z ) x3, clockwise from outside
    (p0, tl) = parse_vector(tl)?;
    (p1, tl) = parse_vector(tl)?;
    (p2, tl) = parse_vector(tl)?;

    // texture name, quoted in some editors
    (texture, tl) = parse_next_token(tl)?;

    let texgen = match version {
        QuakeVersion::Quake2 => {
            let u;
            let v;
            let rotation;
            let scale_x;
            let scale_y;

            (u, tl) = parse_projection(tl)?;
            (v, tl) = parse_projection(tl)?;
            (rotation, tl) = parse_float(tl)?;
            (scale_x, tl) = parse_float(tl)?;
            (scale_y, tl) = parse_float(tl)?;

            FaceTexGen::Quake2 { u, v, rotation, scale_x, scale_y }
        }
        QuakeVersion::Quake3 => {
            let shift_u;
            let shift_v;
            let rotation;
            let scale_x;
            let scale_y;

            (shift_u, tl) = parse_float(tl)?;
            (shift_v, tl) = parse_float(tl)?;
            (rotation, tl) = parse_float(tl)?;
            (scale_x, tl) = parse_float(tl)?;
            (scale_y, tl) = parse_float(tl)?;

            // content, surface flags and value are not used
            for _ in 0..3 {
                (_, tl) = parse_next_token(tl)?;
            }

            FaceTexGen::Quake3 { shift_u, shift_v, rotation, scale_x, scale_y }
        }
    };

    Ok((
        RawFace {
            points: [p0, p1, p2],
            texture: texture.trim_matches('\"').to_string(),
            texgen,
        },
        tl,
    ))
}

fn parse_brush<'t, 'l>(
    mut tl: &'l [&'t str],
    version: QuakeVersion,
) -> Result<(RawBrush, &'l [&'t str]), MapParseError<'t>> {
    (_, tl) = parse_literal(tl, "{")?;

    let mut faces = Vec::new();

    while tl.first() == Some(&"(") {
        let face;
        (face, tl) = parse_brush_face(tl, version)?;
        faces.push(face);
    }

    (_, tl) = parse_literal(tl, "}")?;

    Ok((RawBrush { faces }, tl))
}

fn parse_property<'t, 'l>(tl: &'l [&'t str]) -> Result<((&'t str, &'t str), &'l [&'t str]), MapParseError<'t>> {
    let (key, tl) = parse_next_token(tl)?;
    let (value, tl) = parse_next_token(tl)?;

    if true
        && key.len() >= 2
        && key.starts_with('\"')
        && key.ends_with('\"')
        && value.len() >= 2
        && value.starts_with('\"')
        && value.ends_with('\"')
    {
        Ok(((&key[1..key.len() - 1], &value[1..value.len() - 1]), tl))
    } else {
        Err(MapParseError::InvalidProperty { key, value })
    }
}

impl<'t> RawMap<'t> {
    /// Parse `.map` text laid out for `version`
    pub fn parse(str: &'t str, version: QuakeVersion) -> Result<RawMap<'t>, MapParseError<'t>> {
        let tokens = tokenize(str);

        let mut entities = Vec::<RawEntity<'t>>::new();
        let mut tl = tokens.as_slice();

        'parsing_loop: loop {
            match parse_literal(tl, "{") {
                Ok((_, new_tl)) => tl = new_tl,
                Err(MapParseError::NextTokenExpected) => break 'parsing_loop,
                Err(parsing_error) => return Err(parsing_error),
            }

            let mut entity = RawEntity::default();

            'entity_contents: loop {
                match tl.first() {
                    Some(&"{") => {
                        let brush;
                        (brush, tl) = parse_brush(tl, version)?;
                        entity.brushes.push(brush);
                    }
                    Some(&"}") | None => break 'entity_contents,
                    Some(_) => {
                        let property;
                        (property, tl) = parse_property(tl)?;
                        entity.properties.push(property);
                    }
                }
            }

            (_, tl) = parse_literal(tl, "}")?;

            entities.push(entity);
        }

        Ok(RawMap { entities })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUAKE2_MAP: &str = r#"
// Game: Torque
{
"classname" "worldspawn"
"detail_number" "0"
{
( 0 0 64 ) ( 0 64 64 ) ( 64 64 64 ) stone [ 1 0 0 0 ] [ 0 -1 0 0 ] 0 1 1
( 0 0 0 ) ( 64 0 0 ) ( 64 64 0 ) "stone" [ 1 0 0 8 ] [ 0 -1 0 0 ] 0 1 1
}
}
{
"classname" "target"
"origin" "8 8 8"
}
"#;

    #[test]
    fn tokenizer_skips_comments_and_keeps_quotes() {
        let tokens = tokenize("// comment\n\"class name\" ( 1 2 ) // another\n}");

        assert_eq!(tokens, vec!["\"class name\"", "(", "1", "2", ")", "}"]);
    }

    #[test]
    fn quake2_map() {
        let map = RawMap::parse(QUAKE2_MAP, QuakeVersion::Quake2).expect("valid map");

        assert_eq!(map.entities.len(), 2);

        let world = &map.entities[0];
        assert_eq!(world.class_name(), Some("worldspawn"));
        assert_eq!(world.property("DETAIL_NUMBER"), Some("0"));
        assert_eq!(world.brushes.len(), 1);

        let faces = &world.brushes[0].faces;
        assert_eq!(faces.len(), 2);
        assert_eq!(faces[0].texture, "stone");
        assert_eq!(faces[1].texture, "stone");
        assert_eq!(faces[0].points[1], Vec3d::new(0.0, 64.0, 64.0));

        match faces[1].texgen {
            FaceTexGen::Quake2 { u, scale_x, .. } => {
                assert_eq!(u, [1.0, 0.0, 0.0, 8.0]);
                assert_eq!(scale_x, 1.0);
            }
            FaceTexGen::Quake3 { .. } => panic!("quake 2 face expected"),
        }

        assert_eq!(map.entities[1].property("origin"), Some("8 8 8"));
    }

    #[test]
    fn quake3_face() {
        let text = "{ \"classname\" \"worldspawn\" { ( 0 0 0 ) ( 1 0 0 ) ( 1 1 0 ) base 16 0 90 0.5 0.5 0 0 0 } }";
        let map = RawMap::parse(text, QuakeVersion::Quake3).expect("valid map");

        let face = &map.entities[0].brushes[0].faces[0];
        assert_eq!(
            face.texgen,
            FaceTexGen::Quake3 { shift_u: 16.0, shift_v: 0.0, rotation: 90.0, scale_x: 0.5, scale_y: 0.5 }
        );
    }

    #[test]
    fn errors() {
        assert!(matches!(
            RawMap::parse("{ \"classname\" \"worldspawn\" { ( 0 0 x ) } }", QuakeVersion::Quake2),
            Err(MapParseError::FloatParsingError { token: "x", .. })
        ));
        assert_eq!(
            RawMap::parse("{ \"classname\" worldspawn }", QuakeVersion::Quake2),
            Err(MapParseError::InvalidProperty { key: "\"classname\"", value: "worldspawn" })
        );
        assert_eq!(
            RawMap::parse("{ \"classname\" \"worldspawn\"", QuakeVersion::Quake2),
            Err(MapParseError::NextTokenExpected)
        );
        assert_eq!(
            RawMap::parse("( 1 2 3 )", QuakeVersion::Quake2),
            Err(MapParseError::UnexpectedToken { actual: "(", expected: "{" })
        );
    }
}

// parse.rs
