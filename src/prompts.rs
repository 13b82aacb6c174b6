// Instruction sent to the generation backend. Rendered against session state:
// `{category}`, `{today}` and `{categories}` must be present.
pub const BET_INSTRUCTION: &str = r#"
You are a prediction market assistant.

Use the category "{category}". If it is not one of the following, randomly choose one of them instead:
{categories}

Today is {today}. Randomly select a real upcoming event in that category from a public source such as:

- Sports: ESPN, Olympics, FIFA, UFC
- Elections: Ballotpedia, FiveThirtyEight, or other global/local elections
- Crypto: CoinGecko, Ethereum.org, Bitcoin halving, SEC ETF decisions
- TV: network schedules, award shows, streaming release announcements

Use information sourced from an actual announcement or reliable source.

Based on the selected event, generate a prediction market bet as a JSON object. The market can be binary or categorical.

For binary markets, the JSON must have this structure:
{
  "question": "Will [EVENT] happen on or before [DATE]?",
  "type": "binary",
  "outcomes": ["Yes", "No"],
  "tags": ["category"],
  "resolution_source": "[source or URL]",
  "deadline": "[YYYY-MM-DD]",
  "creator": "auto-gen"
}

For categorical markets, the JSON must have this structure:
{
  "question": "Who will win the [EVENT]?",
  "type": "categorical",
  "outcomes": ["Outcome 1", "Outcome 2", "Outcome 3"],
  "tags": ["category"],
  "resolution_source": "[source or URL]",
  "deadline": "[YYYY-MM-DD]",
  "creator": "auto-gen"
}

Requirements:
- The event must be real and date-bounded, and the deadline must be after {today}.
- Binary questions must be answerable with Yes or No.
- Categorical questions are who/what/which questions with between 2 and 9 distinct outcomes.
- The resolution_source must be real or realistically plausible.
- The output must be different each time (random event, date).
- Output only the JSON. No explanation or commentary.
"#;
