use chrono::{DateTime, Utc};

/// Builder for power profile documents as the meter sends them
pub struct TestProfileBuilder {
    startts: Option<String>,
    values: Vec<String>,
    declaration: bool,
}

impl TestProfileBuilder {
    /// Create a new TestProfileBuilder with no header and no readings
    pub fn new() -> Self {
        Self { startts: None, values: Vec::new(), declaration: true }
    }

    /// Set the start timestamp from a UTC time, RFC 3339 encoded
    pub fn start(self, start: DateTime<Utc>) -> Self {
        self.startts(start.format("%Y-%m-%dT%H:%M:%SZ").to_string())
    }

    /// Set the raw `startts` text
    pub fn startts(mut self, text: impl Into<String>) -> Self {
        self.startts = Some(text.into());
        self
    }

    /// Append wattage readings
    pub fn wattages(mut self, watts: &[i64]) -> Self {
        self.values.extend(watts.iter().map(|w| w.to_string()));
        self
    }

    /// Append a raw `<v>` body, e.g. a non-numeric value
    pub fn raw_value(mut self, text: impl Into<String>) -> Self {
        self.values.push(text.into());
        self
    }

    /// Leave out the `<?xml ...?>` declaration
    pub fn without_declaration(mut self) -> Self {
        self.declaration = false;
        self
    }

    pub fn build(&self) -> String {
        let mut xml = String::new();
        if self.declaration {
            xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        }
        xml.push_str("<reply>\n");
        if let Some(startts) = &self.startts {
            xml.push_str(&format!("  <header><startts>{startts}</startts><cnt>{}</cnt></header>\n", self.values.len()));
        }
        for value in &self.values {
            xml.push_str(&format!("  <v>{value}</v>\n"));
        }
        xml.push_str("</reply>\n");
        xml
    }
}

impl Default for TestProfileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
