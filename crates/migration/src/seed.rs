//! Reference categories and subcategories loaded by the seed migration.

/// `(category, subcategories)` pairs.
pub const REFERENCE_CATEGORIES: &[(&str, &[&str])] = &[
    (
        "Web Development",
        &[
            "Frontend Development",
            "Backend Development",
            "Full Stack Development",
            "E-commerce Development",
            "WordPress Development",
        ],
    ),
    (
        "Graphic Design",
        &[
            "Logo Design",
            "Brand Identity",
            "Illustration",
            "UI/UX Design",
        ],
    ),
    (
        "Digital Marketing",
        &[
            "Search Engine Optimization",
            "Social Media Marketing",
            "Content Marketing",
            "Email Marketing",
        ],
    ),
    (
        "Writing & Translation",
        &[
            "Copywriting",
            "Technical Writing",
            "Proofreading & Editing",
            "Translation",
        ],
    ),
];

/// Seeded subcategory names for `category`, empty when it is not a reference category.
pub fn subcategories_of(category: &str) -> &'static [&'static str] {
    REFERENCE_CATEGORIES
        .iter()
        .find(|(name, _)| *name == category)
        .map(|(_, subcategories)| *subcategories)
        .unwrap_or(&[])
}
