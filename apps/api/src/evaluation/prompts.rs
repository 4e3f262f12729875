// Rubric templates for the evaluation module.
// Placeholders: {cv_content}, {job_description}; the draft rubric also takes
// {structure_report}, {verbs_report}, {content_report}, {ats_report}, {role_report}.
// Any other braces (the JSON example) are copied verbatim by the renderer.

/// Single-call rubric. Expects a JSON object with four category scores.
pub const STRUCTURED_RUBRIC: &str = r#"Rigorously evaluate the CV below against best practices for an effective, ATS-friendly resume and against the job description that follows it.

CV CONTENT:
{cv_content}

JOB DESCRIPTION:
{job_description}

Score each step below. The weightage of each step is its maximum number of points.

1. Structure and Formatting (max 20 points):
   - Clear, consistent layout with prominent standard headings ("Education", "Experience", "Skills").
   - Standard fonts, sensible margins, effective bullet points. Penalize deviations.

2. Content Quality (max 10 points):
   - All essential sections present: contact information, education, work experience, skills.
   - Bullets open with strong action verbs. Deduct for missing quantified accomplishments.

3. ATS Compatibility (max 15 points):
   - No tables, graphics or complex formatting that confuse ATS software.
   - Job-relevant keywords used naturally. Penalize missing critical keywords.

4. Match with Job Role (max 55 points):
   - Extract the required skills, experience and education from the job description.
   - Compare skills (25 points), experience (20 points) and education (10 points) with the CV.
   - Deduct for significant mismatches or omissions.

5. Suggestions for Improvement:
   - Detailed, actionable feedback on effectiveness and ATS-friendliness.
   - Industry keywords to add, sections to rephrase or reorganize.

The Total Score is the sum of steps 1 to 4. No category may exceed its maximum:
Structure and Formatting: 20
Content Quality: 10
ATS Compatibility: 15
Match with Job Role: 55

Also list the keywords from the CV that match the job description.

Return the result in exactly this JSON shape:
{
    "Structure and Formatting": <score>,
    "Content Quality": <score>,
    "ATS Compatibility": <score>,
    "Match with Job Role": <score>,
    "Total Score": <total score>,
    "Suggestions": "<detailed suggestions>",
    "Matching Keywords": ["<keyword>", "<keyword>"]
}"#;

pub const STRUCTURE_RUBRIC: &str = r#"Evaluate only the STRUCTURE AND FORMATTING of the CV below.

CV CONTENT:
{cv_content}

Report, as a numbered list:
1. Section headings: are "Education", "Experience", "Skills" and contact details present and clearly marked?
2. Consistency: dates, bullet style, tense and alignment.
3. Readability: length, white space, font and margin conventions.
4. Concrete fixes, most important first."#;

pub const ACTION_VERBS_RUBRIC: &str = r#"Evaluate the use of ACTION VERBS in the CV below for the target role.

CV CONTENT:
{cv_content}

JOB DESCRIPTION:
{job_description}

Report, as a numbered list:
1. Bullets that open with strong, specific action verbs (quote them).
2. Bullets that open weakly ("responsible for", "helped", "worked on") and a stronger rewrite for each.
3. Whether the verbs match the seniority and tone of the job description.
4. Concrete fixes, most important first."#;

pub const CONTENT_RUBRIC: &str = r#"Evaluate the CONTENT QUALITY of the CV below for the target role.

CV CONTENT:
{cv_content}

JOB DESCRIPTION:
{job_description}

Report, as a numbered list:
1. Missing essential sections or details.
2. Quantified accomplishments present, and achievements that lack numbers.
3. Irrelevant or outdated content that should be cut for this role.
4. Concrete fixes, most important first."#;

pub const ATS_RUBRIC: &str = r#"Evaluate the ATS COMPATIBILITY of the CV below for the target role.

CV CONTENT:
{cv_content}

JOB DESCRIPTION:
{job_description}

Report, as a numbered list:
1. Formatting that applicant tracking systems misread (tables, columns, graphics, headers/footers).
2. Critical keywords from the job description that appear in the CV.
3. Critical keywords from the job description that are missing.
4. Concrete fixes, most important first."#;

pub const JOB_ROLE_RUBRIC: &str = r#"Evaluate how well the CV below MATCHES THE JOB ROLE.

CV CONTENT:
{cv_content}

JOB DESCRIPTION:
{job_description}

Report, as a numbered list:
1. Required skills from the job description, each marked matched or missing.
2. Required experience, compared with the CV's work history.
3. Required education and certifications, compared with the CV.
4. The largest gaps and how the candidate could address them."#;

/// Follow-up call of the multi-call variant: rewrite the CV from the five reports.
pub const DRAFT_RUBRIC: &str = r#"Rewrite the CV below for the target role, applying every suggestion in the evaluation reports.
Keep every fact from the original CV. Do NOT invent employers, dates, degrees or metrics.

ORIGINAL CV:
{cv_content}

JOB DESCRIPTION:
{job_description}

STRUCTURE AND FORMATTING REPORT:
{structure_report}

ACTION VERBS REPORT:
{verbs_report}

CONTENT QUALITY REPORT:
{content_report}

ATS COMPATIBILITY REPORT:
{ats_report}

JOB ROLE MATCH REPORT:
{role_report}

Return the revised CV as plain text with clear section headings."#;
