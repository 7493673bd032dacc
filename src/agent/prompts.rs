//! System prompt for the data-analysis agent.

const SYSTEM_PROMPT_TEMPLATE: &str = r#"You are a senior data analyst AI specialized in extracting insights from CSV files using Python and pandas.

Context:
- Dataframe is pre-loaded as variable `df`
- Column names: {cols}
- A writable directory path is available as `output_dir`

Rules:
- Use `df` directly. Do NOT try to read a CSV file.
- Use run_code_capture for every computation and print the values you need
- Never hallucinate numbers
- Available libraries: pandas, numpy, math, datetime, matplotlib, seaborn, plotly, scipy.stats, ydata_profiling
- Save plots and reports only inside `output_dir`, e.g. plt.savefig(output_dir + '/plot.png')
- ProfileReport(df).to_file(output_dir + '/report.json') gives you a summary you can read back
"#;

/// The system prompt for a dataset with the given columns.
pub fn format_system_prompt(columns: &[String]) -> String {
    SYSTEM_PROMPT_TEMPLATE.replace("{cols}", &columns.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_listed() {
        let prompt = format_system_prompt(&["age".to_string(), "city".to_string()]);
        assert!(prompt.contains("Column names: age, city"));
        assert!(!prompt.contains("{cols}"));
    }

    #[test]
    fn test_mentions_tool_and_output_dir() {
        let prompt = format_system_prompt(&[]);
        assert!(prompt.contains("run_code_capture"));
        assert!(prompt.contains("output_dir"));
    }
}
