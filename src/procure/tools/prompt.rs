use crate::procure::tools::agent::{DocumentKind, EMIT_TOOL, LOOKUP_TOOL};
use crate::procure::tools::error::Result;
use crate::procure::tools::schema::{DATE_FORMAT_HINT, SchemaVariant};

/// Everything the instructions are parameterised on.
#[derive(Debug, Clone)]
pub struct PromptContext<'a> {
    pub documents: &'a [DocumentKind],
    pub table_keys: &'a [&'a str],
    pub schema: SchemaVariant,
}

/// Builds the instruction text sent alongside the documents.
pub fn build_prompt(ctx: &PromptContext<'_>) -> Result<String> {
    let document_list = ctx
        .documents
        .iter()
        .map(|kind| kind.label())
        .collect::<Vec<_>>()
        .join(", ");
    let mut prompt = String::from("**ROLE & GOAL:**\n");
    prompt.push_str(&format!(
        "You are an AI agent specializing in procurement data processing. Extract information \
         from the provided documents ({document_list}), use the `{LOOKUP_TOOL}` function to find \
         corresponding codes in the master data, then call the `{EMIT_TOOL}` function once with \
         the final, complete record.\n"
    ));

    prompt.push_str("\n**AVAILABLE DOCUMENTS:**\n");
    for kind in DocumentKind::ALL {
        let line = if ctx.documents.contains(&kind) {
            format!("- {} PDF (provided)\n", kind.label())
        } else {
            format!("- No {} document is provided.\n", kind.label())
        };
        prompt.push_str(&line);
    }

    let keys = ctx
        .table_keys
        .iter()
        .map(|key| format!("`{key}`"))
        .collect::<Vec<_>>()
        .join(", ");
    prompt.push_str(&format!("\n**AVAILABLE MASTER DATA KEYS:**\n{keys}\n"));
    prompt.push_str(
        "\n**NOTE:** Keys are `filename.xlsx` for single-sheet files and \
         `filename.xlsx_SheetName` for each sheet of a multi-sheet file. Use them exactly.\n",
    );

    prompt.push_str("\n**CRITICAL REQUIREMENTS:**\n");
    prompt.push_str(&format!(
        "1. Use the VENDOR CODE, not the vendor name.\n\
         2. Format every date as {DATE_FORMAT_HINT} (e.g. 19.07.2025).\n\
         3. Look up the tax code matching the invoice's GST percentage in the master data.\n\
         4. Every value in the record must be a string.\n"
    ));

    prompt.push_str("\n**INSTRUCTIONS:**\n");
    prompt.push_str(&format!(
        "1. Extract Data: read every provided document for PO number, vendor, dates, amounts, \
         service descriptions, tax details and requestor or approver names.\n\
         2. Enrich Data: call `{LOOKUP_TOOL}` to find the GL Account (from the service \
         description), the Tax Code (from the tax percentage), the Requestor ID (from the \
         ticket's requester name) and any other codes the master data holds.\n\
         3. Construct Final Data: assemble one JSON object matching the schema below.\n\
         4. Generate CSV: call `{EMIT_TOOL}` with that JSON object serialised as a string.\n"
    ));

    let template = serde_json::to_string_pretty(&ctx.schema.template())?;
    prompt.push_str(&format!(
        "\n**OUTPUT JSON SCHEMA (for {EMIT_TOOL}):**\n{template}\n"
    ));

    prompt.push_str(
        "\n**IMPORTANT NOTES:**\n\
         - Extract actual values from the documents where possible.\n\
         - If a lookup fails, say so in your response but continue processing.\n\
         - Keep monetary values as plain numbers without currency symbols.\n\
         \nBegin the process now.\n",
    );

    Ok(prompt)
}
