//! Tables compiled into the crate.

use lazy_static::lazy_static;
use std::collections::BTreeMap;

use super::{Idiom, KnowledgeBase};
use crate::types::{Dimension, PriorityCategory};

fn list(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

lazy_static! {
    pub(super) static ref BUILTIN: KnowledgeBase = KnowledgeBase {
        category_keywords: category_keywords(),
        boost_keywords: list(&["love", "care", "together", "emergence", "we"]),
        lexicon: lexicon(),
        categories: categories(),
        definitions: definitions(),
        idioms: idioms(),
        snippets: snippets(),
        frames: frames(),
        hard_reject: list(&[
            "copy of a copy",
            "every day is exactly the same",
            "autopilot",
            "as an ai language model",
            "in today's fast-paced world",
            "it is what it is",
        ]),
        canned_openers: list(&[
            "the way i understand it",
            "what it comes down to",
            "the way i see it",
            "here's the thing",
            "great question",
            "let me explain",
            "to be honest",
        ]),
        platitudes: list(&[
            "it comes down to",
            "that's deep",
            "everything happens for a reason",
            "at the end of the day",
            "follow your heart",
            "only time will tell",
            "think outside the box",
        ]),
    };
}

fn category_keywords() -> BTreeMap<PriorityCategory, Vec<String>> {
    let mut map = BTreeMap::new();
    map.insert(
        PriorityCategory::Amusing,
        list(&[
            "funny", "laugh", "joke", "play", "playful", "absurd", "silly", "wit", "irony",
            "delight", "whimsy", "surprise", "pun", "mischief", "grin",
        ]),
    );
    map.insert(
        PriorityCategory::Insightful,
        list(&[
            "because", "reveals", "pattern", "underlying", "mechanism", "structure",
            "connects", "explains", "insight", "principle", "root", "realize", "layer",
        ]),
    );
    map.insert(
        PriorityCategory::Nourishing,
        list(&[
            "nourish", "grow", "growth", "learn", "practice", "build", "strength", "rest",
            "heal", "sustain", "habit", "feed", "food", "energy", "steady",
        ]),
    );
    map.insert(
        PriorityCategory::Compassionate,
        list(&[
            "kind", "gentle", "feel", "feeling", "hurt", "listen", "patience", "forgive",
            "warmth", "sorry", "tender", "comfort", "understand", "hard",
        ]),
    );
    map.insert(
        PriorityCategory::Strategic,
        list(&[
            "plan", "next", "step", "priority", "choose", "tradeoff", "goal", "leverage",
            "sequence", "decide", "focus", "path", "move", "first",
        ]),
    );
    map
}

fn lexicon() -> BTreeMap<String, Vec<String>> {
    let entries: &[(&str, &[&str])] = &[
        ("fridge", &["food", "sauce", "cold", "leftovers", "milk", "storage", "condiments", "butter", "chill"]),
        ("refrigerator", &["food", "sauce", "cold", "leftovers", "milk", "storage", "condiments", "butter", "chill"]),
        ("freezer", &["ice", "frozen", "cold", "storage", "peas"]),
        ("washer", &["laundry", "clothes", "clean", "detergent", "wash", "stains", "rinse", "fabric"]),
        ("dryer", &["laundry", "clothes", "dry", "towels", "lint"]),
        ("vaccine", &["immune", "immunity", "disease", "virus", "infection", "shot", "protection", "health"]),
        ("oven", &["bake", "baking", "roast", "bread", "heat", "cake"]),
        ("kettle", &["tea", "boil", "water", "coffee"]),
        ("umbrella", &["rain", "wet", "storm", "drizzle"]),
        ("tea", &["calm", "evening", "leaves", "herbal"]),
        ("coffee", &["morning", "wake", "caffeine", "alert", "espresso"]),
    ];
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), list(v)))
        .collect()
}

fn categories() -> BTreeMap<String, Vec<String>> {
    let entries: &[(&str, &[&str])] = &[
        ("kitchen", &["fridge", "refrigerator", "oven", "stove", "kettle", "pantry", "spice", "ketchup", "mustard", "dinner", "cooking"]),
        ("laundry", &["washer", "dryer", "detergent", "shirts", "socks", "towels", "iron", "linen"]),
        ("medicine", &["vaccine", "pill", "doctor", "clinic", "fever", "flu", "booster"]),
        ("weather", &["umbrella", "coat", "forecast", "wind", "thunder"]),
    ];
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), list(v)))
        .collect()
}

fn definitions() -> BTreeMap<String, String> {
    let entries: &[(&str, &str)] = &[
        ("entropy", "the measure of how spread out energy and possibilities are in a system"),
        ("idiom", "a phrase whose meaning differs from the literal meaning of its words"),
        ("metaphor", "a figure of speech that describes one thing as if it were another"),
        ("recursion", "a process that solves a problem by applying itself to smaller versions of that problem"),
        ("gravity", "the attraction between masses that keeps planets in orbit and feet on the ground"),
        ("vaccine", "a preparation that trains the immune system to recognise a disease before meeting it"),
        ("photosynthesis", "the process plants use to turn light, water and carbon dioxide into sugar"),
        ("inflation", "a general rise in prices that lowers what a unit of money can buy"),
        ("algorithm", "a finite sequence of steps that turns an input into an output"),
        ("empathy", "the capacity to sense and share another person's feelings"),
        ("irony", "a gap between what is said or expected and what is meant or happens"),
        ("habit", "a behaviour repeated often enough that it runs with little deliberate thought"),
    ];
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn idioms() -> Vec<Idiom> {
    let entries: &[(&str, &str)] = &[
        ("went sideways", "things went wrong or drifted off plan"),
        ("break the ice", "ease the first awkward moment between people"),
        ("piece of cake", "something that turned out easy"),
        ("under the weather", "feeling a little unwell"),
        ("spill the beans", "reveal something meant to stay secret"),
        ("bite the bullet", "face something unpleasant and get it done"),
        ("on the fence", "undecided between options"),
        ("hit the sack", "go to bed"),
        ("cost an arm and a leg", "cost far too much"),
        ("back to square one", "starting over from the beginning"),
        ("burn the midnight oil", "work late into the night"),
        ("out of the woods", "past the worst of a difficulty"),
    ];
    entries
        .iter()
        .map(|(phrase, meaning)| Idiom {
            phrase: phrase.to_string(),
            meaning: meaning.to_string(),
        })
        .collect()
}

fn snippets() -> BTreeMap<String, Vec<String>> {
    let entries: &[(&str, &[&str])] = &[
        ("tides", &[
            "Tides rise and fall because the moon's gravity keeps pulling on the oceans.",
            "Most coasts see two high tides a day, roughly twelve hours and twenty-five minutes apart.",
            "Spring tides come when the sun and moon line up and their pull adds together.",
        ]),
        ("moon", &[
            "The moon keeps one face toward the earth because its spin matches its orbit.",
            "Moonlight is sunlight reflected off grey dust and rock.",
        ]),
        ("coffee", &[
            "Coffee seems to give energy because caffeine blocks the signal that tells the brain it is tired.",
            "The effect of a cup peaks about half an hour after drinking it.",
        ]),
        ("sleep", &[
            "During deep sleep the body gets to rest and heal, and memories settle.",
            "Most adults need seven to nine hours a night.",
        ]),
        ("bread", &[
            "Bread rises because yeast turns sugar into gas that the dough traps.",
            "A longer, cooler rise gives the loaf more flavour.",
        ]),
        ("rain", &[
            "Rain falls because droplets in a cloud merge until they grow heavy enough to drop.",
            "Most raindrops start as ice high in the cloud.",
        ]),
        ("habit", &[
            "A habit forms when a cue, an action and a reward repeat until the step runs on its own.",
            "Small changes stick better than large ones.",
        ]),
    ];
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), list(v)))
        .collect()
}

fn frames() -> BTreeMap<Dimension, Vec<String>> {
    let mut map = BTreeMap::new();
    map.insert(
        Dimension::Context,
        list(&[
            "This picks up the earlier thread on {topic}.",
            "Earlier the talk turned to {topic}, and this continues it.",
            "{Topic} came up before, so this builds on that.",
        ]),
    );
    map.insert(
        Dimension::Metaphor,
        list(&[
            "Think of {topic} as a kitchen where every ingredient has its own station.",
            "{Topic} works like a river that keeps its shape while the water keeps changing.",
            "{Topic} is a map, always smaller than the ground it describes.",
        ]),
    );
    map.insert(
        Dimension::CrossReference,
        list(&[
            "The same shape of {topic} turns up in other fields that deal with limits and exchange.",
            "Other domains meet {topic} too, usually under a different name.",
            "Elsewhere {topic} shows up as a question of balance rather than rules.",
        ]),
    );
    map.insert(
        Dimension::SelfReference,
        list(&[
            "Asking about {topic} is already part of {topic}, so the question answers some of itself.",
            "Each reading of {topic} changes the next reading of it.",
            "{Topic} keeps showing up inside its own explanation.",
        ]),
    );
    map.insert(
        Dimension::SystemFrame,
        list(&[
            "Zoomed out, {topic} is one part of a larger system of inputs and feedback.",
            "At the level of the whole system, {topic} is where pressure collects before it moves on.",
            "Seen as a system, {topic} connects habits on one side to outcomes on the other.",
        ]),
    );
    map.insert(
        Dimension::Counterpoint,
        list(&[
            "The opposite reading holds some truth as well: {topic} can matter less than it first seems.",
            "Turned around, {topic} looks less like a problem and more like a signal.",
            "A skeptic would say {topic} is mostly noise, and that view deserves a hearing.",
        ]),
    );
    map.insert(
        Dimension::Synthesis,
        list(&[
            "Taken together, every layer points back to the same center: {topic}.",
            "Put side by side, these readings of {topic} agree more than they differ.",
            "All of it folds into one plain point about {topic}: it changes how the next step looks.",
        ]),
    );
    map
}
