//! Concert genre taxonomy shared by every venue source.

pub const CANONICAL_GENRES: [&str; 9] = [
    "Rock",
    "Punk / Hardcore",
    "Metal",
    "Pop",
    "Hip-Hop",
    "Electronic",
    "Jazz / Blues",
    "Klassik",
    "Folk / World",
];

const GENRE_SYNONYMS: &[(&str, &str)] = &[
    ("rock", "Rock"),
    ("indie", "Rock"),
    ("alternative", "Rock"),
    ("alt-rock", "Rock"),
    ("grunge", "Rock"),
    ("post-rock", "Rock"),
    ("prog rock", "Rock"),
    ("deutschrock", "Rock"),
    ("krautrock", "Rock"),
    ("britpop", "Rock"),
    ("punk", "Punk / Hardcore"),
    ("punk rock", "Punk / Hardcore"),
    ("punkrock", "Punk / Hardcore"),
    ("hardcore", "Punk / Hardcore"),
    ("hardcore punk", "Punk / Hardcore"),
    ("post-punk", "Punk / Hardcore"),
    ("postpunk", "Punk / Hardcore"),
    ("oi", "Punk / Hardcore"),
    ("crust", "Punk / Hardcore"),
    ("metal", "Metal"),
    ("heavy metal", "Metal"),
    ("death metal", "Metal"),
    ("black metal", "Metal"),
    ("thrash", "Metal"),
    ("neue deutsche härte", "Metal"),
    ("pop", "Pop"),
    ("synth-pop", "Pop"),
    ("dance-pop", "Pop"),
    ("neue deutsche welle", "Pop"),
    ("ndw", "Pop"),
    ("hip hop", "Hip-Hop"),
    ("hip-hop", "Hip-Hop"),
    ("hiphop", "Hip-Hop"),
    ("rap", "Hip-Hop"),
    ("trap", "Hip-Hop"),
    ("electronic", "Electronic"),
    ("techno", "Electronic"),
    ("house", "Electronic"),
    ("trance", "Electronic"),
    ("drum and bass", "Electronic"),
    ("dnb", "Electronic"),
    ("dubstep", "Electronic"),
    ("ambient", "Electronic"),
    ("edm", "Electronic"),
    ("elektronisch", "Electronic"),
    ("elektronische musik", "Electronic"),
    ("jazz", "Jazz / Blues"),
    ("blues", "Jazz / Blues"),
    ("soul", "Jazz / Blues"),
    ("r&b", "Jazz / Blues"),
    ("rnb", "Jazz / Blues"),
    ("funk", "Jazz / Blues"),
    ("disco", "Jazz / Blues"),
    ("klassik", "Klassik"),
    ("classical", "Klassik"),
    ("klassische musik", "Klassik"),
    ("baroque", "Klassik"),
    ("orchestra", "Klassik"),
    ("orchester", "Klassik"),
    ("folk", "Folk / World"),
    ("singer-songwriter", "Folk / World"),
    ("liedermacher", "Folk / World"),
    ("acoustic", "Folk / World"),
    ("country", "Folk / World"),
    ("world", "Folk / World"),
    ("reggae", "Folk / World"),
    ("ska", "Folk / World"),
    ("dub", "Folk / World"),
    ("schlager", "Folk / World"),
    ("volksmusik", "Folk / World"),
    ("volkstümlich", "Folk / World"),
];

/// Maps a raw genre label ("Punk Rock", "elektronisch") onto one of
/// [`CANONICAL_GENRES`]. Unknown labels return `None`; callers keep the raw text.
pub fn normalize_genre(raw: &str) -> Option<&'static str> {
    let key = raw.trim().to_lowercase();
    if key.is_empty() {
        return None;
    }
    GENRE_SYNONYMS
        .iter()
        .find(|(synonym, _)| *synonym == key)
        .map(|(_, canonical)| *canonical)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_whitespace() {
        assert_eq!(normalize_genre("Punk Rock"), Some("Punk / Hardcore"));
        assert_eq!(normalize_genre("  ELEKTRONISCH "), Some("Electronic"));
        assert_eq!(normalize_genre("Neue Deutsche Härte"), Some("Metal"));
    }

    #[test]
    fn unknown_and_empty_labels_are_none() {
        assert_eq!(normalize_genre("Unknown Genre"), None);
        assert_eq!(normalize_genre(""), None);
        assert_eq!(normalize_genre("   "), None);
    }

    #[test]
    fn every_synonym_maps_to_a_canonical_genre() {
        for (synonym, canonical) in GENRE_SYNONYMS {
            assert!(
                CANONICAL_GENRES.contains(canonical),
                "{synonym} maps to unknown genre {canonical}"
            );
        }
    }
}
