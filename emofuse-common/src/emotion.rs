//! Canonical emotion categories and per-category score vectors
//!
//! Classifier wrappers report free-form labels ("joy", "ang", "Calm", ...).
//! Everything downstream of submission works with [`Category`] and the
//! fixed-size [`ScoreVector`] indexed by it.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// One of the seven canonical emotion labels
///
/// Declaration order is the tie-break priority: when two categories score
/// exactly the same, the one declared first wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Happy,
    Sad,
    Angry,
    Surprised,
    Fearful,
    Disgusted,
    Neutral,
}

impl Category {
    /// Number of canonical categories
    pub const COUNT: usize = 7;

    /// All categories in priority order
    pub const ALL: [Category; Category::COUNT] = [
        Category::Happy,
        Category::Sad,
        Category::Angry,
        Category::Surprised,
        Category::Fearful,
        Category::Disgusted,
        Category::Neutral,
    ];

    /// Position of this category inside a [`ScoreVector`]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Happy => "happy",
            Category::Sad => "sad",
            Category::Angry => "angry",
            Category::Surprised => "surprised",
            Category::Fearful => "fearful",
            Category::Disgusted => "disgusted",
            Category::Neutral => "neutral",
        }
    }

    pub fn is_neutral(self) -> bool {
        self == Category::Neutral
    }

    /// Map a classifier label onto a canonical category
    ///
    /// Returns `None` for labels outside the synonym table. Matching ignores
    /// case and surrounding whitespace.
    pub fn lookup(label: &str) -> Option<Category> {
        let label = label.trim().to_lowercase();
        let category = match label.as_str() {
            "happy" | "joy" | "happiness" | "contentment" | "love" | "admiration" | "hap" => {
                Category::Happy
            }
            "sad" | "sadness" | "melancholy" => Category::Sad,
            "angry" | "anger" | "annoyance" | "frustration" | "ang" => Category::Angry,
            "surprised" | "surprise" | "ps" | "sur" => Category::Surprised,
            "fearful" | "fear" | "anxiety" | "scared" | "fea" => Category::Fearful,
            "disgusted" | "disgust" | "contempt" | "dis" => Category::Disgusted,
            "neutral" | "calm" | "unknown" | "neu" => Category::Neutral,
            _ => return None,
        };
        Some(category)
    }

    /// Like [`Category::lookup`], but unknown labels fall back to neutral
    pub fn normalize(label: &str) -> Category {
        Self::lookup(label).unwrap_or(Category::Neutral)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Probability-like score per category
///
/// Serialized as a `{label: score}` object in category priority order.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScoreVector([f64; Category::COUNT]);

impl ScoreVector {
    pub fn zeros() -> Self {
        Self([0.0; Category::COUNT])
    }

    pub fn get(&self, category: Category) -> f64 {
        self.0[category.index()]
    }

    pub fn set(&mut self, category: Category, score: f64) {
        self.0[category.index()] = score;
    }

    pub fn sum(&self) -> f64 {
        self.0.iter().sum()
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|s| s.is_finite())
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, f64)> + '_ {
        Category::ALL.iter().map(move |&c| (c, self.get(c)))
    }

    /// Build a distribution around a single label
    ///
    /// `confidence` goes to `label`; the remainder is spread evenly over the
    /// other six categories.
    pub fn synthesize(label: Category, confidence: f64) -> Self {
        let confidence = confidence.clamp(0.0, 1.0);
        let rest = (1.0 - confidence) / (Category::COUNT - 1) as f64;
        let mut scores = Self([rest; Category::COUNT]);
        scores.set(label, confidence);
        scores
    }

    /// Build a distribution from raw classifier `(label, score)` pairs
    ///
    /// Labels are normalized (synonyms accumulate into one category), negative
    /// or non-finite scores count as zero, and the result is rescaled to sum
    /// to 1. Returns `None` when no usable mass remains.
    pub fn from_labeled<I, S>(pairs: I) -> Option<Self>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: AsRef<str>,
    {
        let mut scores = Self::zeros();
        for (label, score) in pairs {
            if score.is_finite() && score > 0.0 {
                let category = Category::normalize(label.as_ref());
                scores.0[category.index()] += score;
            }
        }
        scores.normalized()
    }

    /// Rescale to sum 1, or `None` if the total mass is not positive and finite
    pub fn normalized(self) -> Option<Self> {
        let total = self.sum();
        if !total.is_finite() || total <= 0.0 {
            return None;
        }
        let mut out = self;
        for score in out.0.iter_mut() {
            *score /= total;
        }
        Some(out)
    }

    /// Weighted element-wise sum of two vectors
    pub fn blend(a: &ScoreVector, weight_a: f64, b: &ScoreVector, weight_b: f64) -> Self {
        let mut out = Self::zeros();
        for (i, score) in out.0.iter_mut().enumerate() {
            *score = weight_a * a.0[i] + weight_b * b.0[i];
        }
        out
    }

    /// Highest-scoring category, earliest category winning exact ties
    pub fn argmax(&self) -> (Category, f64) {
        self.best_where(|_| true)
    }

    /// Highest-scoring category other than `excluded`
    pub fn best_excluding(&self, excluded: Category) -> (Category, f64) {
        self.best_where(|c| c != excluded)
    }

    fn best_where(&self, keep: impl Fn(Category) -> bool) -> (Category, f64) {
        let mut best: Option<(Category, f64)> = None;
        for (category, score) in self.iter() {
            if !keep(category) {
                continue;
            }
            match best {
                Some((_, top)) if score <= top => {}
                _ => best = Some((category, score)),
            }
        }
        best.unwrap_or((Category::Neutral, 0.0))
    }
}

impl Serialize for ScoreVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Category::COUNT))?;
        for (category, score) in self.iter() {
            map.serialize_entry(category.as_str(), &score)?;
        }
        map.end()
    }
}
