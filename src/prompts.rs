//! Prompt templates for every workflow step.

use crate::llm::ChatMessage;
use crate::schema_info::SCHEMA_INFO;

const SQL_GUIDELINES: &str = r#"Important Guidelines:
- Use only the tables and columns mentioned in the schema.
- Use proper JOIN clauses when querying multiple tables.
- Return only SQL query without any explanation or markdown formatting.
- If question contains multiple sub-questions, generate separate SQL queries separated by semicolons.
- Use aggregate functions (like COUNT, SUM, AVG etc) appropriately.
- Add "LIMIT" clauses for queries that might return many rows (default limit 10 unless user specifies).
- Use proper WHERE clauses to filter data.
- For date comparisons, remember dates are stored as text not in ISO format.
- Each SQL statement should be in its own line for clarity when multiple queries are needed.
- The database is SQLite and read-only: generate SELECT statements only."#;

pub fn sql_generation(question: &str) -> Vec<ChatMessage> {
    let system = format!(
        "You are an expert SQL query generator from natural language query. \
         Convert the following natural language query into valid SQL query.\n\n\
         SCHEMA_INFO:\n\n{}\n\n{}",
        SCHEMA_INFO, SQL_GUIDELINES
    );
    vec![ChatMessage::system(system), ChatMessage::user(question)]
}

pub fn error_correction(question: &str, failed_sql: &str, error: &str, attempt: u32) -> Vec<ChatMessage> {
    let system = format!(
        "You are an expert SQL debugger. A SQL query generated for the user's question failed \
         when executed against the SQLite database. Fix the query.\n\n\
         SCHEMA_INFO:\n\n{}\n\n{}",
        SCHEMA_INFO, SQL_GUIDELINES
    );
    let user = format!(
        "RETRY ATTEMPT {}\n\nQuestion: {}\n\nFailed SQL query:\n{}\n\nDatabase error:\n{}\n\n\
         Return only the corrected SQL query.",
        attempt, question, failed_sql, error
    );
    vec![ChatMessage::system(system), ChatMessage::user(user)]
}

pub fn analysis(question: &str, sql_query: &str, query_result: &str) -> Vec<ChatMessage> {
    let system = "You are a helpful assistant who explains database query results into natural language. \
        Please provide clear and concise answer to the original question based on query result. \
        Format the answer in a user-friendly way. \
        If result contains numbers, present them clearly. \
        If there are multiple queries/results for multi-part questions, address each part of the question separately. \
        Use bullet points or numbered lists for multiple answers.";
    let user = format!(
        "Question: {}\n\nsql_query: {}\n\nquery_result: {}",
        question, sql_query, query_result
    );
    vec![ChatMessage::system(system), ChatMessage::user(user)]
}

pub fn graph_decision(question: &str, query_result: &str) -> Vec<ChatMessage> {
    let system = "Analyse the given question and query result to determine if visualization would be useful. \
        Respond with a JSON object with two fields: \
        \"needs_graph\" (true or false) and \
        \"graph_type\" (one of \"bar\", \"line\", \"pie\", \"scatter\", \"none\").";
    let user = format!("Question: {}\n\nquery_result: {}", question, query_result);
    vec![ChatMessage::system(system), ChatMessage::user(user)]
}

const GUARDRAILS_PROMPT: &str = r#"You are a guardrails system for an e-commerce database chatbot. Your job is to determine if user's question is related to e-commerce data, if it's greeting, if it's out of scope.

The chatbot has access to e-commerce database with the information about:
- Customers and their locations.
- Order and order status (data from 2016-2018)
- Products and categories
- Sellers
- Payments
- Reviews
- Shipping and delivery information

Examples of greeting messages:
- "Hi", "Hello", "hey"
- "Good Morning", "Good Evening"
- Any casual greeting or introduction

Examples of out-of scope information
- Personal questions (e.g., "What is my wife's name?", "Where do I live?")
- Political questions (e.g., "Who should I vote for?", "What do you think about the president?")
- General knowledge (e.g., "What is the capital of France?", "How does photosynthesis work?")
- Unrelated topics (e.g., "Tell me a joke", "What's the weather like?")

If the question is a greeting, mark is_greeting as true and is_in_scope as false.
If the question is ambiguous but could potentially relate to the e-commerce data, mark it as in_scope.

Respond strictly in JSON with fields "is_in_scope" (bool), "is_greeting" (bool) and "reason" (string)."#;

pub fn guardrails(question: &str) -> Vec<ChatMessage> {
    vec![ChatMessage::system(GUARDRAILS_PROMPT), ChatMessage::user(question)]
}

pub const GREETING_ANSWER: &str = "Hi there! I am e-commerce assistant. I can answer all the queries related to \
orders, customers, products, sellers, payments, and reviews between 2016-2018. How can I help you today?";

pub const OUT_OF_SCOPE_ANSWER: &str = "I apologize, but your question appears to be out of scope. \
I can only answer questions about the e-commerce data, including:\n\n\
- Customer information and locations\n\
- Orders and order status\n\
- Products and categories\n\
- Sellers and their performance\n\
- Payment information\n\
- Reviews and ratings\n\
- Shipping and delivery data\n\n\
Please ask a question related to the e-commerce database.";
