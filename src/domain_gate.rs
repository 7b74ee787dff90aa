/// Fixed reply for questions outside the health domain. Always sent in English.
pub const REFUSAL_REPLY: &str =
    "Sorry, I can only answer questions related to healthcare, diseases, first aid, pollution, or safety.";

pub const HEALTH_KEYWORDS: &[&str] = &[
    "disease", "fever", "infection", "virus", "bacteria", "medicine", "treatment",
    "symptom", "injury", "pain", "poison", "gas leak", "toxic", "prevention",
    "vaccine", "malaria", "diabetes", "hospital", "doctor", "nurse", "health",
    "first aid", "phc", "clinic", "epidemic", "nuclear fallout", "contamination",
    "pollution", "gas tragedy", "mask", "radiation", "emergency", "therapy",
    "wound", "fracture", "sanitation", "hygiene", "cholera", "typhoid", "asthma",
];

/// Keyword admission filter run before any retrieval or generation.
#[derive(Debug, Clone)]
pub struct DomainGate {
    keywords: Vec<String>,
}

impl DomainGate {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    pub fn health() -> Self {
        Self::new(HEALTH_KEYWORDS)
    }

    pub fn is_in_domain(&self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        self.keywords.iter().any(|k| lowered.contains(k.as_str()))
    }
}
