//! Remediation text shown once a tool keeps failing the same way.

use colloquy_core::{ErrorTrackingState, PatternCategory};

const FONT_SUGGESTION: &str = "I'm encountering repeated font-related errors. This appears to be an environment issue.

Suggestions:
1. You can use a different plotting backend that doesn't require specific fonts
2. Try using `plt.rcParams['font.family'] = 'DejaVu Sans'` or another available font
3. Generate plots without text labels temporarily
4. Contact your system administrator to install the missing fonts

Would you like me to try one of these alternatives, or would you prefer to address the font issue first?";

const MODULE_SUGGESTION: &str = "I'm encountering repeated module import errors. The required packages may not be installed.

Suggestions:
1. Install the missing package using uv (faster) or pip:
   - `!uv pip install package_name` (recommended, 10-100x faster)
   - `!pip install package_name` (traditional)
2. Use alternative packages that are already installed
3. Check the environment with the `check_environment` function

What would you like me to do?";

const PERMISSION_SUGGESTION: &str = "I'm encountering repeated permission errors. This appears to be a system configuration issue.

This might be due to:
1. File system permissions
2. Docker container restrictions
3. Security policies

Please check your system configuration or contact your administrator.";

const RESOURCE_SUGGESTION: &str = "I'm encountering repeated resource errors (memory/disk space).

Suggestions:
1. Try processing smaller datasets
2. Free up system resources
3. Restart the container

Would you like me to try a different approach?";

const PLOTTING_SUGGESTION: &str = "I'm encountering repeated plotting/visualization errors. This may be due to the display backend configuration.

Suggestions:
1. Switch to a non-interactive backend: `plt.switch_backend('Agg')`
2. Save plots without displaying: `plt.savefig('plot.png', bbox_inches='tight')`
3. Use simpler plotting libraries or export data for external visualization
4. Try reducing plot complexity (fewer data points, simpler styles)

Would you like me to try one of these alternatives?";

const FILE_IO_SUGGESTION: &str = "I'm encountering repeated file I/O errors. This may be due to permissions or file system issues.

Suggestions:
1. Try saving to a different filename or location
2. Check if the file is already open in another program
3. Use a different file format (e.g., PNG instead of PDF)
4. Save to memory buffer instead of file

How would you like to proceed?";

/// Number of raw errors quoted in the generic suggestion.
const RECENT_ERRORS_SHOWN: usize = 3;

/// Suggestion for `category`, or `None` when there is no category.
///
/// System categories get a generic message quoting the first line of the
/// most recent errors in `tracking`.
pub fn suggestion_for(
    category: Option<PatternCategory>,
    tracking: &ErrorTrackingState,
) -> Option<String> {
    let text = match category? {
        PatternCategory::Font => FONT_SUGGESTION.to_string(),
        PatternCategory::Module => MODULE_SUGGESTION.to_string(),
        PatternCategory::Permission => PERMISSION_SUGGESTION.to_string(),
        PatternCategory::Resource => RESOURCE_SUGGESTION.to_string(),
        PatternCategory::Plotting => PLOTTING_SUGGESTION.to_string(),
        PatternCategory::FileIo => FILE_IO_SUGGESTION.to_string(),
        PatternCategory::System(_) => generic_suggestion(tracking),
    };
    Some(text)
}

fn generic_suggestion(tracking: &ErrorTrackingState) -> String {
    let recent = tracking
        .recent(RECENT_ERRORS_SHOWN)
        .map(|r| format!("- {}", r.error.lines().next().unwrap_or("").trim()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "I'm encountering repeated errors while executing this task.

Recent errors:
{recent}

Would you like me to:
1. Try a different approach
2. Break down the task into smaller steps
3. Check the environment configuration

Please let me know how you'd like to proceed."
    )
}
