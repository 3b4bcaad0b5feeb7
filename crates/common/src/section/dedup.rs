// Identity repair for template sections and fields.
//
// Copy/paste paths and racing saves can leave a template with two sections
// (or fields) sharing an id, or with fields pointing at a section that no
// longer exists. `repair` rewrites the duplicates before the template is
// turned into a live form:
//
// - The first occurrence of an id keeps it; later occurrences get
//   `<id>~<n>` with the smallest free `n >= 2`.
// - The k-th copy of a field follows the k-th copy of its section, so a
//   duplicated section keeps its own duplicated fields.
// - Fields whose section does not exist are moved to the first section in
//   display order.

use std::collections::{HashMap, HashSet};

use crate::types::{Field, Section};

/// Repaired layout plus counts of what changed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RepairedLayout {
    pub sections: Vec<Section>,
    pub fields: Vec<Field>,
    pub rewritten_sections: usize,
    pub rewritten_fields: usize,
    pub rehomed_fields: usize,
}

impl RepairedLayout {
    pub fn is_clean(&self) -> bool {
        self.rewritten_sections == 0 && self.rewritten_fields == 0 && self.rehomed_fields == 0
    }
}

pub fn repair(sections: Vec<Section>, fields: Vec<Field>) -> RepairedLayout {
    let mut taken: HashSet<String> = sections.iter().map(|s| s.id.clone()).collect();

    // Original section id -> ids of each occurrence, in order.
    let mut occurrences: HashMap<String, Vec<String>> = HashMap::new();
    let mut rewritten_sections = 0;
    let mut repaired_sections = Vec::with_capacity(sections.len());
    for mut section in sections {
        let copies = occurrences.entry(section.id.clone()).or_default();
        if !copies.is_empty() {
            let fresh = fresh_id(&section.id, &mut taken);
            section.id = fresh;
            rewritten_sections += 1;
        }
        copies.push(section.id.clone());
        repaired_sections.push(section);
    }

    let fallback_section = repaired_sections
        .iter()
        .min_by_key(|s| s.order)
        .map(|s| s.id.clone());

    taken.extend(fields.iter().map(|f| f.id.clone()));
    let mut field_seen: HashMap<String, usize> = HashMap::new();
    let mut rewritten_fields = 0;
    let mut rehomed_fields = 0;
    let mut repaired_fields = Vec::with_capacity(fields.len());
    for mut field in fields {
        let nth = field_seen.entry(field.id.clone()).or_insert(0);
        let copy_index = *nth;
        *nth += 1;

        if copy_index > 0 {
            field.id = fresh_id(&field.id, &mut taken);
            rewritten_fields += 1;
        }

        match occurrences.get(&field.box_id) {
            Some(copies) => {
                let target = &copies[copy_index.min(copies.len() - 1)];
                if *target != field.box_id {
                    field.box_id = target.clone();
                }
            }
            None => {
                if let Some(fallback) = &fallback_section {
                    field.box_id = fallback.clone();
                    rehomed_fields += 1;
                }
            }
        }
        repaired_fields.push(field);
    }

    RepairedLayout {
        sections: repaired_sections,
        fields: repaired_fields,
        rewritten_sections,
        rewritten_fields,
        rehomed_fields,
    }
}

fn fresh_id(base: &str, taken: &mut HashSet<String>) -> String {
    let mut n = 2usize;
    loop {
        let candidate = format!("{base}~{n}");
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}
