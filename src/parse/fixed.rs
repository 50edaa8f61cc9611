// src/parse/fixed.rs
//
// Fixed-width layout of the INSEE death export: character offsets per
// field, applied unconditionally. Offsets are characters, not bytes,
// because names carry accented letters.

use super::{ParsedRecord, Sex};

/// (start, end) character offsets, in field order.
const COLSPECS: &[(usize, usize)] = &[
    (0, 80),    // nom + prénom
    (80, 81),   // sexe
    (81, 89),   // date naissance AAAAMMJJ
    (89, 94),   // code lieu naissance
    (94, 124),  // commune naissance
    (124, 154), // pays naissance
    (154, 162), // date décès AAAAMMJJ
    (162, 167), // code lieu décès
    (167, 176), // numéro d'acte
];

/// Total width of a canonical line, in characters.
pub const LINE_WIDTH: usize = 176;

fn slice(chars: &[char], spec: (usize, usize)) -> String {
    let start = spec.0.min(chars.len());
    let end = spec.1.min(chars.len());
    chars[start..end].iter().collect()
}

/// Slice one line into its fields. Short lines yield empty trailing
/// fields; a line whose sex column is not a known code yields `None`.
pub fn parse_line(line: &str) -> Option<ParsedRecord> {
    let chars: Vec<char> = line.chars().collect();

    let sexe = Sex::from_code(&slice(&chars, COLSPECS[1]))?;

    Some(ParsedRecord {
        nom_prenom: slice(&chars, COLSPECS[0]),
        sexe,
        date_naissance: slice(&chars, COLSPECS[2]),
        code_lieu_naissance: slice(&chars, COLSPECS[3]),
        commune_naissance: slice(&chars, COLSPECS[4]),
        pays_naissance: slice(&chars, COLSPECS[5]),
        date_deces: slice(&chars, COLSPECS[6]),
        code_lieu_deces: slice(&chars, COLSPECS[7]),
        numero_acte: slice(&chars, COLSPECS[8]),
    })
}
